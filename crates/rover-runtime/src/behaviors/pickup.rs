//! PickUp: close on the nearest cube and grab it.
//!
//! Pushed by Search once a cube is inside `pickup_range`.  The approach is a
//! [`SteeringController`][rover_hal::SteeringController] on the cube's
//! bearing with forward speed falling off as the bearing grows.  When the
//! cube is inside both `grab_distance` and `grab_bearing` the rover stops and
//! reports `possession = Some(true)`.
//!
//! Once holding a cube PickUp looks for home: a center marker inside
//! `drop_range` pushes Drop, otherwise the rover turns in place.
//!
//! PickUp pops itself when its target has been out of sight for
//! `lost_target_ticks` consecutive ticks, or when the optional
//! `timeout_ticks` runs out.

use rover_hal::SteeringController;
use rover_types::{BehaviorKind, DriveCommand};
use tracing::debug;

use super::{BehaviorConfig, BehaviorInput, BehaviorOutput, TransitionRequest};

/// Resume context for PickUp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickUpContext {
    /// Ticks since the frame was pushed.
    pub ticks: u32,
    /// Consecutive ticks without the current target in view.
    pub lost_ticks: u32,
    /// Give up after this many ticks.  `None` never times out.
    pub timeout_ticks: Option<u32>,
    pub steering: SteeringController,
}

impl PickUpContext {
    pub fn new(config: &BehaviorConfig) -> Self {
        Self {
            ticks: 0,
            lost_ticks: 0,
            timeout_ticks: config.pickup_timeout_ticks,
            steering: config.steering(),
        }
    }

    pub(crate) fn timed_out(&self) -> bool {
        self.timeout_ticks.is_some_and(|limit| self.ticks > limit)
    }
}

pub fn step(input: &BehaviorInput<'_>, ctx: &mut PickUpContext) -> BehaviorOutput {
    if !input.snapshot.is_ready() {
        return BehaviorOutput::stop();
    }
    let config = input.config;
    let targets = input.targets;

    ctx.ticks = ctx.ticks.saturating_add(1);
    if ctx.timed_out() {
        debug!(ticks = ctx.ticks, "pickup timed out");
        return BehaviorOutput::stop().with_transition(TransitionRequest::PopSelf);
    }

    if targets.has_cube {
        if let Some(home) = targets
            .nearest_center_marker()
            .filter(|m| m.distance <= config.drop_range)
        {
            ctx.lost_ticks = 0;
            let angular = ctx.steering.update(home.bearing, input.dt);
            return BehaviorOutput::drive(config.mix(config.approach_linear(home.bearing), angular))
                .with_transition(TransitionRequest::PushChild(BehaviorKind::Drop));
        }
        return lost(input, ctx, config.spin(1.0));
    }

    let Some(cube) = targets.nearest_cube() else {
        return lost(input, ctx, DriveCommand::STOP);
    };
    ctx.lost_ticks = 0;

    if cube.distance <= config.grab_distance && cube.bearing.abs() <= config.grab_bearing {
        debug!(tag = cube.id, distance = cube.distance, "cube grabbed");
        ctx.steering.reset();
        return BehaviorOutput::stop().with_possession(true);
    }

    let angular = ctx.steering.update(cube.bearing, input.dt);
    let linear = if cube.distance <= config.grab_distance {
        // Close enough; only the heading is off.
        0.0
    } else {
        config.approach_linear(cube.bearing)
    };
    BehaviorOutput::drive(config.mix(linear, angular))
}

/// Count a tick without the target; pop once the limit is reached.
fn lost(
    input: &BehaviorInput<'_>,
    ctx: &mut PickUpContext,
    command: DriveCommand,
) -> BehaviorOutput {
    ctx.steering.reset();
    ctx.lost_ticks = ctx.lost_ticks.saturating_add(1);
    if ctx.lost_ticks >= input.config.lost_target_ticks {
        debug!(lost_ticks = ctx.lost_ticks, "pickup target lost");
        return BehaviorOutput::stop().with_transition(TransitionRequest::PopSelf);
    }
    BehaviorOutput::drive(command)
}
