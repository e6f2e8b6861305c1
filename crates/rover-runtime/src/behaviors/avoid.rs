//! Avoid: back away from whatever is too close.
//!
//! - Nearest violation on the left → spin right in place.
//! - Nearest violation on the right → spin left in place.
//! - Nearest violation dead ahead → reverse along an arc that swings the
//!   nose toward the side with more clearance.
//!
//! Avoid never asks to be pushed or popped; the stack removes it once every
//! reading is back above the threshold.

use rover_types::{DriveCommand, ProximitySide};

use super::{BehaviorInput, BehaviorOutput};

/// Resume context for Avoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvoidContext {
    /// Ticks spent in this avoidance episode.
    pub ticks: u32,
}

pub fn step(input: &BehaviorInput<'_>, ctx: &mut AvoidContext) -> BehaviorOutput {
    let Some(triad) = input.snapshot.proximity else {
        return BehaviorOutput::stop();
    };
    ctx.ticks = ctx.ticks.saturating_add(1);

    let Some((side, _)) = triad.violation() else {
        return BehaviorOutput::stop();
    };

    let s = input.config.avoid_speed;
    let (left, right) = match side {
        ProximitySide::Left => (s, -s),
        ProximitySide::Right => (-s, s),
        ProximitySide::Center if triad.left >= triad.right => (-s, -0.5 * s),
        ProximitySide::Center => (-0.5 * s, -s),
    };
    BehaviorOutput::drive(DriveCommand::clamped(left, right, input.config.max_cmd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::test_support::*;
    use crate::behaviors::{BehaviorConfig, TransitionRequest};

    fn run(left: f32, center: f32, right: f32) -> (BehaviorOutput, AvoidContext) {
        let config = BehaviorConfig::default();
        let snapshot = snapshot_with(left, center, right);
        let targets = targets(&[], &[], false);
        let mut ctx = AvoidContext::default();
        let out = step(&input(&snapshot, &targets, &config), &mut ctx);
        (out, ctx)
    }

    #[test]
    fn left_obstacle_spins_right() {
        let (out, ctx) = run(0.05, 1.0, 1.0);
        assert!(out.command.left > 0.0 && out.command.right < 0.0);
        assert_eq!(out.transition, TransitionRequest::None);
        assert_eq!(ctx.ticks, 1);
    }

    #[test]
    fn right_obstacle_spins_left() {
        let (out, _) = run(1.0, 1.0, 0.1);
        assert!(out.command.left < 0.0 && out.command.right > 0.0);
    }

    #[test]
    fn center_obstacle_reverses_toward_clearer_side() {
        // Left clearer: right wheel backs up slower → nose swings left.
        let (out, _) = run(1.5, 0.1, 0.5);
        assert!(out.command.left < 0.0 && out.command.right < 0.0);
        assert!(out.command.right > out.command.left);

        let (out, _) = run(0.5, 0.1, 1.5);
        assert!(out.command.left > out.command.right);
    }

    #[test]
    fn nearest_violation_wins() {
        // Both left and center are close; left is closer.
        let (out, _) = run(0.05, 0.1, 1.0);
        assert!(out.command.left > 0.0 && out.command.right < 0.0);
    }

    #[test]
    fn stops_when_nothing_is_too_close() {
        let (out, ctx) = run(1.0, 1.0, 1.0);
        assert_eq!(out.command, DriveCommand::STOP);
        assert_eq!(ctx.ticks, 1);
    }
}
