//! Search: the base behavior.
//!
//! With nothing in view the rover sweeps: a straight leg of
//! `search_leg_ticks`, then an in-place turn of `search_turn_ticks`, with the
//! turn direction alternating every leg.  The sweep position lives in
//! [`SearchContext`] so an interrupt resumes the pattern where it stopped.
//!
//! Hand-overs:
//! - not holding a cube, cube within `pickup_range` → push PickUp;
//! - holding a cube, home marker within `drop_range` → push Drop.
//!
//! A cube that is visible but out of range is steered toward without
//! advancing the sweep.

use super::{BehaviorInput, BehaviorOutput, TransitionRequest};
use rover_types::BehaviorKind;

/// Resume context for Search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchContext {
    pub tick_in_leg: u32,
    pub legs_completed: u32,
    /// `1.0` turns left at the end of the current leg, `-1.0` right.
    pub turn_sign: f32,
}

impl Default for SearchContext {
    fn default() -> Self {
        Self {
            tick_in_leg: 0,
            legs_completed: 0,
            turn_sign: 1.0,
        }
    }
}

pub fn step(input: &BehaviorInput<'_>, ctx: &mut SearchContext) -> BehaviorOutput {
    if !input.snapshot.is_ready() {
        return BehaviorOutput::stop();
    }
    let config = input.config;
    let targets = input.targets;

    if targets.has_cube {
        if let Some(home) = targets
            .nearest_center_marker()
            .filter(|m| m.distance <= config.drop_range)
        {
            let angular = proportional_turn(input, home.bearing);
            return BehaviorOutput::drive(config.mix(config.approach_linear(home.bearing), angular))
                .with_transition(TransitionRequest::PushChild(BehaviorKind::Drop));
        }
    } else if let Some(cube) = targets.nearest_cube() {
        let angular = proportional_turn(input, cube.bearing);
        let command = config.mix(config.approach_linear(cube.bearing), angular);
        let out = BehaviorOutput::drive(command);
        return if cube.distance <= config.pickup_range {
            out.with_transition(TransitionRequest::PushChild(BehaviorKind::PickUp))
        } else {
            out
        };
    }

    sweep(input, ctx)
}

fn proportional_turn(input: &BehaviorInput<'_>, bearing: f32) -> f32 {
    let limit = input.config.turn_speed;
    (input.config.steer_kp * bearing).clamp(-limit, limit)
}

fn sweep(input: &BehaviorInput<'_>, ctx: &mut SearchContext) -> BehaviorOutput {
    let config = input.config;
    let command = if ctx.tick_in_leg < config.search_leg_ticks {
        config.mix(config.search_speed, 0.0)
    } else {
        config.spin(ctx.turn_sign)
    };

    ctx.tick_in_leg += 1;
    if ctx.tick_in_leg >= config.search_leg_ticks + config.search_turn_ticks {
        ctx.tick_in_leg = 0;
        ctx.legs_completed = ctx.legs_completed.saturating_add(1);
        ctx.turn_sign = -ctx.turn_sign;
    }
    BehaviorOutput::drive(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::BehaviorConfig;
    use crate::behaviors::test_support::*;
    use rover_types::TagDetection;

    fn small_sweep() -> BehaviorConfig {
        BehaviorConfig {
            search_leg_ticks: 3,
            search_turn_ticks: 2,
            ..BehaviorConfig::default()
        }
    }

    #[test]
    fn sweep_alternates_legs_and_turns() {
        let config = small_sweep();
        let snapshot = clear_snapshot();
        let targets = targets(&[], &[], false);
        let mut ctx = SearchContext::default();

        let mut commands = Vec::new();
        for _ in 0..10 {
            commands.push(step(&input(&snapshot, &targets, &config), &mut ctx).command);
        }
        // Three straight ticks, two left turns, three straight, two right turns.
        assert!(commands[..3].iter().all(|c| c.left == c.right && c.left > 0.0));
        assert!(commands[3..5].iter().all(|c| c.left < 0.0 && c.right > 0.0));
        assert!(commands[5..8].iter().all(|c| c.left == c.right));
        assert!(commands[8..10].iter().all(|c| c.left > 0.0 && c.right < 0.0));
        assert_eq!(ctx.legs_completed, 2);
        assert_eq!(ctx.tick_in_leg, 0);
    }

    #[test]
    fn cube_in_range_pushes_pickup() {
        let config = BehaviorConfig::default();
        let snapshot = clear_snapshot();
        let targets = targets(&[TagDetection::cube(3, 0.1, 0.4)], &[], false);
        let mut ctx = SearchContext::default();

        let out = step(&input(&snapshot, &targets, &config), &mut ctx);
        assert_eq!(out.transition, TransitionRequest::PushChild(BehaviorKind::PickUp));
        assert!(out.command.right > out.command.left, "steers toward a cube on the left");
        assert_eq!(ctx, SearchContext::default(), "sweep does not advance");
    }

    #[test]
    fn distant_cube_is_approached_without_escalating() {
        let config = BehaviorConfig::default();
        let snapshot = clear_snapshot();
        let targets = targets(&[TagDetection::cube(3, -0.2, 1.5)], &[], false);
        let mut ctx = SearchContext {
            tick_in_leg: 7,
            ..SearchContext::default()
        };

        let out = step(&input(&snapshot, &targets, &config), &mut ctx);
        assert_eq!(out.transition, TransitionRequest::None);
        assert!(out.command.left > out.command.right);
        assert_eq!(ctx.tick_in_leg, 7);
    }

    #[test]
    fn holding_a_cube_ignores_cubes_and_heads_home() {
        let config = BehaviorConfig::default();
        let snapshot = clear_snapshot();
        let targets = targets(
            &[TagDetection::cube(3, 0.0, 0.3)],
            &[TagDetection::center_marker(0.0, 0.8)],
            true,
        );
        let mut ctx = SearchContext::default();
        let out = step(&input(&snapshot, &targets, &config), &mut ctx);
        assert_eq!(out.transition, TransitionRequest::PushChild(BehaviorKind::Drop));
    }

    #[test]
    fn holding_a_cube_with_home_out_of_range_keeps_sweeping() {
        let config = small_sweep();
        let snapshot = clear_snapshot();
        let targets = targets(&[], &[TagDetection::center_marker(0.0, 2.5)], true);
        let mut ctx = SearchContext::default();
        let out = step(&input(&snapshot, &targets, &config), &mut ctx);
        assert_eq!(out.transition, TransitionRequest::None);
        assert_eq!(ctx.tick_in_leg, 1);
    }
}
