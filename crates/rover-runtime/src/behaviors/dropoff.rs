//! Drop: carry the cube home and let go of it.
//!
//! Drives toward the nearest center marker.  Inside `deposit_distance` the
//! rover stops, reports `possession = Some(false)` and pops itself.  Drop
//! also pops, keeping the cube, when home stays out of sight for
//! `lost_target_ticks` or when the optional timeout runs out.

use rover_hal::SteeringController;
use tracing::debug;

use super::{BehaviorConfig, BehaviorInput, BehaviorOutput, TransitionRequest};

/// Resume context for Drop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropContext {
    pub ticks: u32,
    pub lost_ticks: u32,
    pub timeout_ticks: Option<u32>,
    pub steering: SteeringController,
}

impl DropContext {
    pub fn new(config: &BehaviorConfig) -> Self {
        Self {
            ticks: 0,
            lost_ticks: 0,
            timeout_ticks: config.drop_timeout_ticks,
            steering: config.steering(),
        }
    }
}

pub fn step(input: &BehaviorInput<'_>, ctx: &mut DropContext) -> BehaviorOutput {
    if !input.snapshot.is_ready() {
        return BehaviorOutput::stop();
    }
    let config = input.config;
    let pop = BehaviorOutput::stop().with_transition(TransitionRequest::PopSelf);

    if !input.targets.has_cube {
        return pop;
    }

    ctx.ticks = ctx.ticks.saturating_add(1);
    if ctx.timeout_ticks.is_some_and(|limit| ctx.ticks > limit) {
        debug!(ticks = ctx.ticks, "drop timed out");
        return pop;
    }

    let Some(home) = input.targets.nearest_center_marker() else {
        ctx.steering.reset();
        ctx.lost_ticks = ctx.lost_ticks.saturating_add(1);
        if ctx.lost_ticks >= config.lost_target_ticks {
            debug!(lost_ticks = ctx.lost_ticks, "home marker lost");
            return pop;
        }
        return BehaviorOutput::stop();
    };
    ctx.lost_ticks = 0;

    if home.distance <= config.deposit_distance {
        debug!(distance = home.distance, "cube deposited");
        return pop.with_possession(false);
    }

    let angular = ctx.steering.update(home.bearing, input.dt);
    BehaviorOutput::drive(config.mix(config.approach_linear(home.bearing), angular))
}
