//! [`TargetClassifier`] – the visual target picture.
//!
//! Every detection batch replaces the lists of currently visible home
//! markers and cubes; nothing persists across batches unless it is seen
//! again.  Sighting counters and the yaw error to the closest cube are
//! cumulative.
//!
//! Possession (`has_cube`) is deliberately not inferred from vision: only the
//! pickup and drop behaviors change it, through
//! [`TargetClassifier::set_has_cube`].
//!
//! # Example
//!
//! ```rust
//! use rover_perception::targets::TargetClassifier;
//! use rover_types::TagDetection;
//!
//! let targets = TargetClassifier::default();
//! targets.ingest(&[
//!     TagDetection::cube(1, 0.30, 0.8),
//!     TagDetection::cube(2, -0.10, 0.4),
//! ]);
//! assert_eq!(targets.cube_count(), 2);
//! assert_eq!(targets.last_yaw_error(), -0.10);
//! ```

use rover_types::{DEFAULT_CENTER_MARKER_ID, TagDetection, TagRole};
use tracing::{debug, trace};

use crate::cell::StateCell;

/// Copy of the classifier's state, taken once per tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetState {
    /// Home markers in the latest batch, in detection order.
    pub center_markers: Vec<TagDetection>,
    /// Cubes in the latest batch, in detection order.
    pub cubes: Vec<TagDetection>,
    /// Total cube detections ever ingested.
    pub cube_sightings: u64,
    /// Total home-marker detections ever ingested.
    pub center_sightings: u64,
    /// Bearing of the closest cube in the most recent batch that had one.
    pub last_seen_block_yaw_error: f32,
    /// Whether the rover is physically holding a cube.
    pub has_cube: bool,
}

impl TargetState {
    /// The closest visible cube.
    pub fn nearest_cube(&self) -> Option<&TagDetection> {
        nearest(&self.cubes)
    }

    /// The closest visible home marker.
    pub fn nearest_center_marker(&self) -> Option<&TagDetection> {
        nearest(&self.center_markers)
    }
}

fn nearest(tags: &[TagDetection]) -> Option<&TagDetection> {
    tags.iter().min_by(|a, b| a.distance.total_cmp(&b.distance))
}

#[derive(Debug, Clone)]
struct ClassifierState {
    targets: TargetState,
    enabled: bool,
}

/// Thread-safe classifier.  Share as `Arc<TargetClassifier>`: the detection
/// producer calls [`ingest`][Self::ingest], the tick thread reads.
#[derive(Debug)]
pub struct TargetClassifier {
    center_marker_id: u32,
    state: StateCell<ClassifierState>,
}

impl TargetClassifier {
    /// Classifier that treats `center_marker_id` as the home marker.
    pub fn new(center_marker_id: u32) -> Self {
        Self {
            center_marker_id,
            state: StateCell::new(ClassifierState {
                targets: TargetState::default(),
                enabled: true,
            }),
        }
    }

    /// Build a detection from a raw tag id, assigning its role.
    pub fn classify(&self, id: u32, bearing: f32, distance: f32) -> TagDetection {
        TagDetection::new(id, bearing, distance, TagRole::classify(id, self.center_marker_id))
    }

    /// Replace the visible-tag lists with `detections`.
    ///
    /// No-op while the classifier is disabled.
    pub fn ingest(&self, detections: &[TagDetection]) {
        let (cubes, center_markers): (Vec<TagDetection>, Vec<TagDetection>) = detections
            .iter()
            .copied()
            .partition(|d| d.role == TagRole::Cube);
        let closest_bearing = nearest(&cubes).map(|c| c.bearing);

        let applied = self.state.update(|s| {
            if !s.enabled {
                return false;
            }
            let t = &mut s.targets;
            t.cube_sightings += cubes.len() as u64;
            t.center_sightings += center_markers.len() as u64;
            if let Some(bearing) = closest_bearing {
                t.last_seen_block_yaw_error = bearing;
            }
            t.cubes = cubes;
            t.center_markers = center_markers;
            true
        });

        if applied {
            trace!(count = detections.len(), "tag batch ingested");
        } else {
            trace!("tag batch ignored; classifier disabled");
        }
    }

    /// Enable or disable ingestion.  Disabling also clears the visible-tag
    /// lists so a later re-enable never starts from an old batch.
    pub fn set_enabled(&self, enabled: bool) {
        let changed = self.state.update(|s| {
            let changed = s.enabled != enabled;
            s.enabled = enabled;
            if !enabled {
                s.targets.cubes.clear();
                s.targets.center_markers.clear();
            }
            changed
        });
        if changed {
            debug!(enabled, "target classifier toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.update(|s| s.enabled)
    }

    /// Record physical possession.  Called by the pickup and drop behaviors.
    pub fn set_has_cube(&self, has_cube: bool) {
        self.state.update(|s| s.targets.has_cube = has_cube);
    }

    pub fn has_cube(&self) -> bool {
        self.state.update(|s| s.targets.has_cube)
    }

    pub fn cube_count(&self) -> u64 {
        self.state.update(|s| s.targets.cube_sightings)
    }

    pub fn center_marker_count(&self) -> u64 {
        self.state.update(|s| s.targets.center_sightings)
    }

    pub fn last_yaw_error(&self) -> f32 {
        self.state.update(|s| s.targets.last_seen_block_yaw_error)
    }

    /// Point-in-time copy of the full target picture.
    pub fn snapshot(&self) -> TargetState {
        self.state.update(|s| s.targets.clone())
    }
}

impl Default for TargetClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER_MARKER_ID)
    }
}
