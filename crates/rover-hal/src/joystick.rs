//! Joystick passthrough for the manual modes.
//!
//! Each axis is first gated by a deadzone (`|axis| < deadzone` becomes zero),
//! then scaled by the motor-command ceiling.  The two components are mixed
//! differentially: `left = linear - angular`, `right = linear + angular`,
//! each clamped to `[-ceiling, ceiling]`.
//!
//! ```rust
//! use rover_hal::joystick::{JoystickAxes, JoystickMapper};
//!
//! let mapper = JoystickMapper::new(255.0);
//! let cmd = mapper.map(JoystickAxes { linear: 0.6, angular: 0.0 });
//! assert!((cmd.left - 153.0).abs() < 1e-3);
//! assert!((cmd.right - 153.0).abs() < 1e-3);
//! ```

use rover_types::DriveCommand;

/// Axis magnitude below which input is treated as noise.
pub const DEFAULT_DEADZONE: f32 = 0.1;

/// Motor-command ceiling used by the drive board.
pub const DEFAULT_MAX_MOTOR_CMD: f32 = 255.0;

/// The two joystick axes the rover listens to, nominally in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JoystickAxes {
    pub linear: f32,
    pub angular: f32,
}

/// Maps [`JoystickAxes`] onto a [`DriveCommand`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoystickMapper {
    ceiling: f32,
    deadzone: f32,
}

impl JoystickMapper {
    /// Mapper with the given ceiling and the default deadzone.
    pub fn new(ceiling: f32) -> Self {
        Self {
            ceiling: ceiling.abs(),
            deadzone: DEFAULT_DEADZONE,
        }
    }

    pub fn with_deadzone(mut self, deadzone: f32) -> Self {
        self.deadzone = deadzone.abs();
        self
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Apply the deadzone to one axis and scale it by the ceiling.
    ///
    /// Non-finite input reads as centred.
    pub fn scale_axis(&self, axis: f32) -> f32 {
        if !axis.is_finite() || axis.abs() < self.deadzone {
            0.0
        } else {
            axis * self.ceiling
        }
    }

    pub fn map(&self, axes: JoystickAxes) -> DriveCommand {
        let linear = self.scale_axis(axes.linear);
        let angular = self.scale_axis(axes.angular);
        DriveCommand::mix(linear, angular, self.ceiling)
    }
}

impl Default for JoystickMapper {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MOTOR_CMD)
    }
}
