//! Bearing steering controller.
//!
//! Turns the bearing to a visual target into the angular component of a
//! differential drive command.  The set-point is always "target dead ahead"
//! (bearing `0`), so the error is the bearing itself: a positive bearing
//! (target to the left) produces a positive angular output, which the drive
//! mixer turns into `right > left`.
//!
//! ```rust
//! use rover_hal::steering::SteeringController;
//!
//! let mut steer = SteeringController::new(100.0, 0.0).with_limit(60.0);
//! assert!(steer.update(0.2, 0.1) > 0.0);   // target left → turn left
//! assert_eq!(steer.update(2.0, 0.1), 60.0); // clamped
//! ```

/// Proportional–derivative controller on bearing error.
///
/// The controller is small and `Copy` so it can live inside a behavior's
/// resume context and survive an interrupt with its derivative memory intact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringController {
    kp: f32,
    kd: f32,
    limit: f32,
    last_error: Option<f32>,
}

impl SteeringController {
    /// Create a controller with the given gains and no output limit.
    pub fn new(kp: f32, kd: f32) -> Self {
        Self {
            kp,
            kd,
            limit: f32::INFINITY,
            last_error: None,
        }
    }

    /// Clamp the output to `[-limit, limit]`.
    pub fn with_limit(mut self, limit: f32) -> Self {
        self.limit = limit.abs();
        self
    }

    /// Compute the angular output for the current `bearing` (radians).
    ///
    /// `dt` is the time since the previous update in seconds.  A non-positive
    /// `dt` skips the derivative term.  Non-finite bearings produce `0.0` and
    /// clear the derivative memory.
    pub fn update(&mut self, bearing: f32, dt: f32) -> f32 {
        if !bearing.is_finite() {
            self.last_error = None;
            return 0.0;
        }

        let p = self.kp * bearing;
        let d = match self.last_error {
            Some(prev) if dt > 0.0 => self.kd * (bearing - prev) / dt,
            _ => 0.0,
        };
        self.last_error = Some(bearing);

        (p + d).clamp(-self.limit, self.limit)
    }

    /// Forget derivative memory, e.g. when switching to a new target.
    pub fn reset(&mut self) {
        self.last_error = None;
    }
}
