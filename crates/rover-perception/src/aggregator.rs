//! Sensor aggregation.
//!
//! [`SensorAggregator`] owns one [`StateCell`] per sensor class and accepts
//! updates from any thread.  The tick thread calls
//! [`SensorAggregator::snapshot`] exactly once per cycle and hands the
//! resulting [`Snapshot`] to both the behavior stack and the active behavior,
//! so nothing inside a tick ever re-reads live sensor state.
//!
//! # Invalid readings
//!
//! Proximity readings are never rejected:
//! - NaN, infinite, or beyond-range distances become the sensor's maximum
//!   range.
//! - Negative distances become `0.0`, which always reads as "too close".
//!
//! # Example
//!
//! ```rust
//! use rover_perception::aggregator::{SensorAggregator, SensorSettings};
//! use rover_types::ProximitySide;
//!
//! let sensors = SensorAggregator::new(SensorSettings::default());
//! assert!(!sensors.snapshot().is_ready());
//!
//! for side in ProximitySide::ALL {
//!     sensors.update_proximity(side, 1.0);
//! }
//! let snap = sensors.snapshot();
//! assert!(snap.is_ready());
//! assert_eq!(snap, sensors.snapshot());
//! ```

use std::time::{Duration, Instant};

use rover_types::{
    EncoderCounts, OdometryState, Pose, ProximityChannels, ProximitySide, ProximityTriad,
    normalize_angle,
};
use tracing::{debug, trace};

use crate::cell::StateCell;

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Static proximity sensor parameters plus the initial avoidance settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSettings {
    /// Longest distance the proximity sensors report (metres).
    pub max_range: f32,
    /// Initial avoidance threshold (metres).
    pub min_distance: f32,
    /// Whether avoidance starts enabled.
    pub avoidance_enabled: bool,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            max_range: 3.0,
            min_distance: 0.2,
            avoidance_enabled: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Point-in-time copy of everything the aggregator knows.
///
/// Each field is `None` until its producer has reported at least once.  Two
/// snapshots taken without an intervening write compare equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub proximity: Option<ProximityTriad>,
    pub odometry: Option<OdometryState>,
    pub encoders: Option<EncoderCounts>,
    /// When the least recently written proximity channel was last written.
    /// The triad is only as fresh as its oldest reading.
    pub proximity_updated: Option<Instant>,
    pub odometry_updated: Option<Instant>,
    pub encoders_updated: Option<Instant>,
}

impl Snapshot {
    /// A snapshot in which nothing has been received yet.
    pub fn empty() -> Self {
        Self {
            proximity: None,
            odometry: None,
            encoders: None,
            proximity_updated: None,
            odometry_updated: None,
            encoders_updated: None,
        }
    }

    /// `true` once every proximity channel has reported.  Without it no
    /// behavior can act safely.
    pub fn is_ready(&self) -> bool {
        self.proximity.is_some()
    }

    /// `true` if the proximity triad exists and was written no more than
    /// `stale_after` before `now`.  A zero `stale_after` disables the age
    /// check.
    pub fn proximity_fresh(&self, now: Instant, stale_after: Duration) -> bool {
        match (self.proximity, self.proximity_updated) {
            (Some(_), _) if stale_after.is_zero() => true,
            (Some(_), Some(at)) => now.saturating_duration_since(at) <= stale_after,
            _ => false,
        }
    }

    pub fn pose(&self) -> Option<Pose> {
        self.odometry.map(|o| o.pose)
    }

    /// Copy of `self` with the proximity triad removed, used to mark a stale
    /// triad as missing for the rest of the tick.
    pub fn without_proximity(mut self) -> Self {
        self.proximity = None;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-entity state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct ProximityState {
    channels: ProximityChannels,
    min_distance: f32,
    avoidance_enabled: bool,
    /// Last write per channel, indexed by [`ProximitySide::index`].
    updated_at: [Option<Instant>; 3],
}

impl ProximityState {
    /// Oldest write among the channels that have reported.
    fn oldest_update(&self) -> Option<Instant> {
        self.updated_at.iter().flatten().min().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Stamped<T> {
    value: T,
    at: Instant,
}

// ─────────────────────────────────────────────────────────────────────────────
// SensorAggregator
// ─────────────────────────────────────────────────────────────────────────────

/// Race-free collection point for proximity, odometry and encoder data.
///
/// Share it as `Arc<SensorAggregator>`: producers call the `update_*`
/// methods from their own threads, the tick loop calls [`snapshot`].
///
/// [`snapshot`]: SensorAggregator::snapshot
#[derive(Debug)]
pub struct SensorAggregator {
    max_range: f32,
    proximity: StateCell<ProximityState>,
    odometry: StateCell<Option<Stamped<OdometryState>>>,
    encoders: StateCell<Option<Stamped<EncoderCounts>>>,
}

impl SensorAggregator {
    pub fn new(settings: SensorSettings) -> Self {
        Self {
            max_range: settings.max_range.abs(),
            proximity: StateCell::new(ProximityState {
                channels: ProximityChannels::default(),
                min_distance: settings.min_distance.max(0.0),
                avoidance_enabled: settings.avoidance_enabled,
                updated_at: [None; 3],
            }),
            odometry: StateCell::new(None),
            encoders: StateCell::new(None),
        }
    }

    pub fn max_range(&self) -> f32 {
        self.max_range
    }

    // ── Producers ────────────────────────────────────────────────────────────

    /// Write one proximity channel.  See the [module docs][self] for how
    /// invalid distances are clamped.
    pub fn update_proximity(&self, side: ProximitySide, distance: f32) {
        let clamped = self.clamp_distance(distance);
        if clamped != distance {
            trace!(?side, raw = distance, clamped, "proximity reading clamped");
        }
        let now = Instant::now();
        self.proximity.update(|p| {
            p.channels.set(side, clamped);
            p.updated_at[side.index()] = Some(now);
        });
    }

    /// Replace pose and velocities together.  The heading is wrapped into
    /// `(-π, π]`.
    pub fn update_odometry(&self, pose: Pose, linear_velocity: f32, angular_velocity: f32) {
        let value = OdometryState {
            pose: Pose {
                theta: normalize_angle(pose.theta),
                ..pose
            },
            linear_velocity,
            angular_velocity,
        };
        self.odometry.set(Some(Stamped {
            value,
            at: Instant::now(),
        }));
    }

    /// Replace the encoder counts with absolute values.
    pub fn update_encoders(&self, left: i64, right: i64) {
        self.encoders.set(Some(Stamped {
            value: EncoderCounts { left, right },
            at: Instant::now(),
        }));
    }

    /// Add per-message deltas to the encoder counts, for drivers that report
    /// increments rather than totals.
    pub fn accumulate_encoders(&self, delta_left: i64, delta_right: i64) {
        let now = Instant::now();
        self.encoders.update(|slot| {
            let base = slot.map(|s| s.value).unwrap_or_default();
            *slot = Some(Stamped {
                value: EncoderCounts {
                    left: base.left.saturating_add(delta_left),
                    right: base.right.saturating_add(delta_right),
                },
                at: now,
            });
        });
    }

    // ── Avoidance settings ───────────────────────────────────────────────────

    pub fn set_avoidance_enabled(&self, enabled: bool) {
        let previous = self.proximity.update(|p| {
            std::mem::replace(&mut p.avoidance_enabled, enabled)
        });
        if previous != enabled {
            debug!(enabled, "obstacle avoidance toggled");
        }
    }

    pub fn is_avoidance_enabled(&self) -> bool {
        self.proximity.get().avoidance_enabled
    }

    /// Change the avoidance threshold.  Negative values are treated as `0`.
    pub fn set_min_distance(&self, min_distance: f32) {
        let min_distance = if min_distance.is_finite() {
            min_distance.max(0.0)
        } else {
            0.0
        };
        self.proximity.update(|p| p.min_distance = min_distance);
    }

    pub fn min_distance(&self) -> f32 {
        self.proximity.get().min_distance
    }

    // ── Reader ───────────────────────────────────────────────────────────────

    /// Take a consistent copy of every entity.  Each entity is read under its
    /// own lock, released before the next one is taken.
    pub fn snapshot(&self) -> Snapshot {
        let proximity = self.proximity.get();
        let odometry = self.odometry.get();
        let encoders = self.encoders.get();
        Snapshot {
            proximity: proximity
                .channels
                .triad(proximity.min_distance, proximity.avoidance_enabled),
            odometry: odometry.map(|s| s.value),
            encoders: encoders.map(|s| s.value),
            proximity_updated: proximity.oldest_update(),
            odometry_updated: odometry.map(|s| s.at),
            encoders_updated: encoders.map(|s| s.at),
        }
    }

    fn clamp_distance(&self, distance: f32) -> f32 {
        if !distance.is_finite() || distance > self.max_range {
            self.max_range
        } else if distance < 0.0 {
            0.0
        } else {
            distance
        }
    }
}

impl Default for SensorAggregator {
    fn default() -> Self {
        Self::new(SensorSettings::default())
    }
}
