//! `rover-types` – shared data model for the rover control core.
//!
//! Every other crate in the workspace speaks in these types: sensor values
//! produced by the aggregator, tag detections consumed by the classifier,
//! the drive command emitted each tick, the operator [`Mode`], and the
//! [`Event`] envelope routed over the in-process bus.

use std::f32::consts::PI;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Pose / odometry
// ─────────────────────────────────────────────────────────────────────────────

/// Robot position and heading in the odometry frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// X position (metres).
    pub x: f32,
    /// Y position (metres).
    pub y: f32,
    /// Heading, counter-clockwise from +X (radians, in `(-π, π]`).
    pub theta: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, theta: f32) -> Self {
        Self { x, y, theta }
    }
}

/// Wrap an angle into `(-π, π]`.
pub fn normalize_angle(theta: f32) -> f32 {
    if !theta.is_finite() {
        return 0.0;
    }
    let mut a = theta % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

/// Pose plus the velocities reported alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OdometryState {
    pub pose: Pose,
    /// Forward velocity (m/s).
    pub linear_velocity: f32,
    /// Yaw rate (rad/s).
    pub angular_velocity: f32,
}

/// Accumulated wheel encoder ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncoderCounts {
    pub left: i64,
    pub right: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Proximity
// ─────────────────────────────────────────────────────────────────────────────

/// One of the three forward-facing range sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProximitySide {
    Left,
    Center,
    Right,
}

impl ProximitySide {
    pub const ALL: [ProximitySide; 3] =
        [ProximitySide::Left, ProximitySide::Center, ProximitySide::Right];

    /// Position of this side in per-channel arrays.
    pub fn index(self) -> usize {
        match self {
            ProximitySide::Left => 0,
            ProximitySide::Center => 1,
            ProximitySide::Right => 2,
        }
    }
}

/// A complete set of proximity readings together with the avoidance settings
/// that were in force when they were read.
///
/// Only ever handed out as a whole; a reader never observes one channel from
/// an older write mixed with another from a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityTriad {
    pub left: f32,
    pub center: f32,
    pub right: f32,
    /// Readings strictly below this distance trigger avoidance (metres).
    pub min_distance: f32,
    pub avoidance_enabled: bool,
}

impl ProximityTriad {
    /// Distance reported by `side`.
    pub fn reading(&self, side: ProximitySide) -> f32 {
        match side {
            ProximitySide::Left => self.left,
            ProximitySide::Center => self.center,
            ProximitySide::Right => self.right,
        }
    }

    /// The sensor with the smallest reading.  Ties resolve left, center, right.
    pub fn nearest(&self) -> (ProximitySide, f32) {
        let mut best = (ProximitySide::Left, self.left);
        for side in [ProximitySide::Center, ProximitySide::Right] {
            let d = self.reading(side);
            if d < best.1 {
                best = (side, d);
            }
        }
        best
    }

    /// The nearest reading below `min_distance`, if any.  Ignores the
    /// `avoidance_enabled` flag; see [`ProximityTriad::requires_avoidance`].
    pub fn violation(&self) -> Option<(ProximitySide, f32)> {
        let (side, d) = self.nearest();
        (d < self.min_distance).then_some((side, d))
    }

    /// `true` when avoidance is enabled and at least one reading is too close.
    pub fn requires_avoidance(&self) -> bool {
        self.avoidance_enabled && self.violation().is_some()
    }
}

/// Raw per-channel proximity storage; `None` until the channel first reports.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProximityChannels {
    readings: [Option<f32>; 3],
}

impl ProximityChannels {
    pub fn set(&mut self, side: ProximitySide, distance: f32) {
        self.readings[side.index()] = Some(distance);
    }

    pub fn get(&self, side: ProximitySide) -> Option<f32> {
        self.readings[side.index()]
    }

    /// Assemble a triad once every channel has reported at least once.
    pub fn triad(&self, min_distance: f32, avoidance_enabled: bool) -> Option<ProximityTriad> {
        let [Some(left), Some(center), Some(right)] = self.readings else {
            return None;
        };
        Some(ProximityTriad {
            left,
            center,
            right,
            min_distance,
            avoidance_enabled,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────────────────────────────────────

/// Fiducial id carried by the home-base markers.
pub const DEFAULT_CENTER_MARKER_ID: u32 = 256;

/// What a fiducial tag marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagRole {
    /// Home-base marker; cubes are deposited here.
    CenterMarker,
    /// Collectible target.
    Cube,
}

impl TagRole {
    pub fn classify(id: u32, center_marker_id: u32) -> Self {
        if id == center_marker_id {
            TagRole::CenterMarker
        } else {
            TagRole::Cube
        }
    }
}

/// One fiducial detection.  Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagDetection {
    pub id: u32,
    /// Horizontal angle to the tag relative to the camera axis (radians,
    /// positive to the left).
    pub bearing: f32,
    /// Distance to the tag (metres).
    pub distance: f32,
    pub role: TagRole,
}

impl TagDetection {
    pub fn new(id: u32, bearing: f32, distance: f32, role: TagRole) -> Self {
        Self {
            id,
            bearing,
            distance,
            role,
        }
    }

    pub fn cube(id: u32, bearing: f32, distance: f32) -> Self {
        Self::new(id, bearing, distance, TagRole::Cube)
    }

    pub fn center_marker(bearing: f32, distance: f32) -> Self {
        Self::new(DEFAULT_CENTER_MARKER_ID, bearing, distance, TagRole::CenterMarker)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Drive command
// ─────────────────────────────────────────────────────────────────────────────

/// Differential wheel command, in motor-command units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriveCommand {
    pub left: f32,
    pub right: f32,
}

impl DriveCommand {
    pub const STOP: DriveCommand = DriveCommand {
        left: 0.0,
        right: 0.0,
    };

    /// Build a command with both wheels clamped to `[-max_cmd, max_cmd]`.
    /// Non-finite inputs become `0.0`.
    pub fn clamped(left: f32, right: f32, max_cmd: f32) -> Self {
        let clamp = |v: f32| {
            if v.is_finite() {
                v.clamp(-max_cmd, max_cmd)
            } else {
                0.0
            }
        };
        Self {
            left: clamp(left),
            right: clamp(right),
        }
    }

    /// Mix a linear and an angular component: `left = linear - angular`,
    /// `right = linear + angular`, both clamped.
    pub fn mix(linear: f32, angular: f32, max_cmd: f32) -> Self {
        Self::clamped(linear - angular, linear + angular, max_cmd)
    }

    pub fn is_stop(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Behaviors / modes
// ─────────────────────────────────────────────────────────────────────────────

/// The behaviors that can occupy a stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BehaviorKind {
    Avoid,
    Search,
    PickUp,
    Drop,
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BehaviorKind::Avoid => "avoid",
            BehaviorKind::Search => "search",
            BehaviorKind::PickUp => "pickup",
            BehaviorKind::Drop => "drop",
        };
        f.write_str(name)
    }
}

/// Operator-selected control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Joystick passthrough.
    ManualLow,
    /// Joystick passthrough.
    ManualHigh,
    /// The behavior stack drives the robot.
    AutoRun,
    /// Autonomous, but frozen: the stack is kept and the robot held still.
    AutoPaused,
}

impl Mode {
    pub fn is_manual(self) -> bool {
        matches!(self, Mode::ManualLow | Mode::ManualHigh)
    }

    pub fn is_autonomous(self) -> bool {
        !self.is_manual()
    }
}

/// One `code → mode` entry in a [`ModeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeBinding {
    pub code: u8,
    pub mode: Mode,
}

/// Configurable mapping from the numeric mode codes sent by the operator
/// station to [`Mode`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeTable {
    pub bindings: Vec<ModeBinding>,
}

impl Default for ModeTable {
    fn default() -> Self {
        Self {
            bindings: vec![
                ModeBinding { code: 0, mode: Mode::ManualLow },
                ModeBinding { code: 1, mode: Mode::ManualHigh },
                ModeBinding { code: 2, mode: Mode::AutoRun },
                ModeBinding { code: 3, mode: Mode::AutoRun },
            ],
        }
    }
}

impl ModeTable {
    /// Look up `code`.  The first matching binding wins.
    pub fn resolve(&self, code: u8) -> Result<Mode, RoverError> {
        self.bindings
            .iter()
            .find(|b| b.code == code)
            .map(|b| b.mode)
            .ok_or(RoverError::UnknownMode(code))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Envelope for everything routed over the in-process bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Publishing component, e.g. `"rover7::controller"`.
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// Outbound wheel command.
    Drive(DriveCommand),
    /// Inbound raw mode code from the operator station.
    ModeCode(u8),
    /// Inbound joystick axes, each nominally in `[-1, 1]`.
    Joystick { linear: f32, angular: f32 },
    /// Periodic liveness string.
    Status(String),
    /// Periodic heartbeat; the content is opaque.
    Heartbeat(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type shared by every rover crate.  None of these are fatal: callers
/// log them and fall back to a safe default.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoverError {
    #[error("Bus Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid Transition: {active} cannot {requested}")]
    InvalidTransition { active: BehaviorKind, requested: String },

    #[error("Sensor Unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Unknown Mode Code: {0}")]
    UnknownMode(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triad(left: f32, center: f32, right: f32) -> ProximityTriad {
        ProximityTriad {
            left,
            center,
            right,
            min_distance: 0.2,
            avoidance_enabled: true,
        }
    }

    #[test]
    fn normalize_angle_wraps_into_half_open_range() {
        assert!((normalize_angle(1.5 * PI) - (-0.5 * PI)).abs() < 1e-5);
        assert!((normalize_angle(-PI) - PI).abs() < 1e-5);
        assert!((normalize_angle(0.5) - 0.5).abs() < 1e-6);
        assert!((normalize_angle(-2.5 * PI) - (-0.5 * PI)).abs() < 1e-5);
        assert_eq!(normalize_angle(f32::NAN), 0.0);
    }

    #[test]
    fn nearest_picks_smallest_reading() {
        assert_eq!(triad(1.0, 0.5, 2.0).nearest(), (ProximitySide::Center, 0.5));
        assert_eq!(triad(0.05, 1.0, 1.0).nearest(), (ProximitySide::Left, 0.05));
        // Ties go to the first sensor.
        assert_eq!(triad(0.3, 0.3, 0.3).nearest().0, ProximitySide::Left);
    }

    #[test]
    fn violation_is_strictly_below_threshold() {
        assert!(triad(0.2, 1.0, 1.0).violation().is_none());
        assert_eq!(
            triad(1.0, 1.0, 0.19).violation(),
            Some((ProximitySide::Right, 0.19))
        );
    }

    #[test]
    fn disabled_avoidance_never_requires_avoidance() {
        let mut t = triad(0.01, 0.01, 0.01);
        assert!(t.requires_avoidance());
        t.avoidance_enabled = false;
        assert!(!t.requires_avoidance());
    }

    #[test]
    fn channels_need_all_three_sides_for_a_triad() {
        let mut ch = ProximityChannels::default();
        ch.set(ProximitySide::Left, 1.0);
        ch.set(ProximitySide::Right, 1.0);
        assert!(ch.triad(0.2, true).is_none());
        ch.set(ProximitySide::Center, 0.4);
        let t = ch.triad(0.2, true).expect("complete triad");
        assert_eq!(t.center, 0.4);
        assert_eq!(ch.get(ProximitySide::Left), Some(1.0));
    }

    #[test]
    fn drive_command_mix_and_clamp() {
        let cmd = DriveCommand::mix(200.0, 100.0, 255.0);
        assert_eq!(cmd, DriveCommand { left: 100.0, right: 255.0 });

        let cmd = DriveCommand::clamped(-400.0, f32::NAN, 255.0);
        assert_eq!(cmd, DriveCommand { left: -255.0, right: 0.0 });
        assert!(DriveCommand::STOP.is_stop());
    }

    #[test]
    fn tag_role_classification() {
        assert_eq!(TagRole::classify(256, DEFAULT_CENTER_MARKER_ID), TagRole::CenterMarker);
        assert_eq!(TagRole::classify(0, DEFAULT_CENTER_MARKER_ID), TagRole::Cube);
        assert_eq!(TagDetection::center_marker(0.0, 1.0).role, TagRole::CenterMarker);
    }

    #[test]
    fn default_mode_table_matches_operator_codes() {
        let table = ModeTable::default();
        assert_eq!(table.resolve(0), Ok(Mode::ManualLow));
        assert_eq!(table.resolve(1), Ok(Mode::ManualHigh));
        assert_eq!(table.resolve(2), Ok(Mode::AutoRun));
        assert_eq!(table.resolve(3), Ok(Mode::AutoRun));
        assert_eq!(table.resolve(9), Err(RoverError::UnknownMode(9)));
        assert!(Mode::AutoPaused.is_autonomous());
        assert!(Mode::ManualHigh.is_manual());
    }

    #[test]
    fn mode_table_loads_from_toml() {
        let raw = r#"
            [[bindings]]
            code = 4
            mode = "auto_paused"
        "#;
        let table: ModeTable = toml::from_str(raw).unwrap();
        assert_eq!(table.resolve(4), Ok(Mode::AutoPaused));
        assert!(table.resolve(0).is_err());
    }

    #[test]
    fn drive_event_roundtrip() {
        let event = Event::new(
            "rover::controller",
            EventPayload::Drive(DriveCommand { left: 12.5, right: -3.0 }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.payload, event.payload);
    }

    #[test]
    fn rover_error_display() {
        let err = RoverError::InvalidTransition {
            active: BehaviorKind::Search,
            requested: "push drop".to_string(),
        };
        assert!(err.to_string().contains("search cannot push drop"));
        assert!(RoverError::UnknownMode(7).to_string().contains('7'));
    }
}
