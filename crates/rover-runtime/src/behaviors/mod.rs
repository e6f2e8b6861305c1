//! Behaviors: pure decision units.
//!
//! Each behavior maps one tick's inputs plus its own resume context to a
//! [`BehaviorOutput`]: a drive command, an optional request to change the
//! stack, and an optional change of physical possession.  Behaviors never
//! touch shared state; the [`BehaviorStack`][crate::stack::BehaviorStack]
//! applies what they ask for.
//!
//! | Behavior | Module | Leaves the stack by |
//! |---|---|---|
//! | Avoid | [`avoid`] | the stack's resolve rule only |
//! | Search | [`search`] | never (base frame) |
//! | PickUp | [`pickup`] | `PopSelf` when the cube is lost or on timeout |
//! | Drop | [`dropoff`] | `PopSelf` after depositing, when home is lost, or on timeout |
//!
//! Every behavior refuses to act on a snapshot without proximity data and
//! returns [`DriveCommand::STOP`] instead.

pub mod avoid;
pub mod dropoff;
pub mod pickup;
pub mod search;

use rover_hal::SteeringController;
use rover_perception::{Snapshot, TargetState};
use rover_types::{BehaviorKind, DriveCommand};
use serde::{Deserialize, Serialize};

pub use avoid::AvoidContext;
pub use dropoff::DropContext;
pub use pickup::PickUpContext;
pub use search::SearchContext;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning shared by all behaviors.  Speeds are in motor-command units,
/// distances in metres, angles in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Ceiling applied to every wheel command.
    pub max_cmd: f32,
    pub search_speed: f32,
    pub turn_speed: f32,
    pub approach_speed: f32,
    pub avoid_speed: f32,
    /// A cube this close lets Search hand over to PickUp.
    pub pickup_range: f32,
    pub grab_distance: f32,
    pub grab_bearing: f32,
    /// A home marker this close lets PickUp/Search hand over to Drop.
    pub drop_range: f32,
    pub deposit_distance: f32,
    /// Consecutive ticks without the target before PickUp/Drop give up.
    pub lost_target_ticks: u32,
    pub search_leg_ticks: u32,
    pub search_turn_ticks: u32,
    pub steer_kp: f32,
    pub steer_kd: f32,
    /// Optional hard limits, copied into fresh PickUp/Drop contexts.
    pub pickup_timeout_ticks: Option<u32>,
    pub drop_timeout_ticks: Option<u32>,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            max_cmd: 255.0,
            search_speed: 120.0,
            turn_speed: 90.0,
            approach_speed: 100.0,
            avoid_speed: 110.0,
            pickup_range: 0.5,
            grab_distance: 0.15,
            grab_bearing: 0.15,
            drop_range: 1.0,
            deposit_distance: 0.3,
            lost_target_ticks: 10,
            search_leg_ticks: 30,
            search_turn_ticks: 8,
            steer_kp: 120.0,
            steer_kd: 10.0,
            pickup_timeout_ticks: None,
            drop_timeout_ticks: None,
        }
    }
}

impl BehaviorConfig {
    pub(crate) fn steering(&self) -> SteeringController {
        SteeringController::new(self.steer_kp, self.steer_kd).with_limit(self.turn_speed)
    }

    /// Linear/angular mix clamped to `max_cmd`.
    pub(crate) fn mix(&self, linear: f32, angular: f32) -> DriveCommand {
        DriveCommand::mix(linear, angular, self.max_cmd)
    }

    /// Turn in place; positive `sign` turns left.
    pub(crate) fn spin(&self, sign: f32) -> DriveCommand {
        self.mix(0.0, sign.signum() * self.turn_speed)
    }

    /// Forward speed while closing on a target at `bearing`: full speed dead
    /// ahead, nothing at or beyond 90°.
    pub(crate) fn approach_linear(&self, bearing: f32) -> f32 {
        self.approach_speed * bearing.cos().max(0.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inputs / outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a behavior may look at during one tick.
#[derive(Debug, Clone, Copy)]
pub struct BehaviorInput<'a> {
    pub snapshot: &'a Snapshot,
    pub targets: &'a TargetState,
    pub config: &'a BehaviorConfig,
    /// Tick period in seconds.
    pub dt: f32,
}

/// What a behavior asks of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRequest {
    None,
    PushChild(BehaviorKind),
    PopSelf,
}

impl std::fmt::Display for TransitionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionRequest::None => f.write_str("stay"),
            TransitionRequest::PushChild(kind) => write!(f, "push {kind}"),
            TransitionRequest::PopSelf => f.write_str("pop"),
        }
    }
}

/// Result of one behavior step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorOutput {
    pub command: DriveCommand,
    pub transition: TransitionRequest,
    /// `Some(held)` when the behavior observed a change of possession.
    pub possession: Option<bool>,
}

impl BehaviorOutput {
    pub fn stop() -> Self {
        Self::drive(DriveCommand::STOP)
    }

    pub fn drive(command: DriveCommand) -> Self {
        Self {
            command,
            transition: TransitionRequest::None,
            possession: None,
        }
    }

    pub fn with_transition(mut self, transition: TransitionRequest) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_possession(mut self, held: bool) -> Self {
        self.possession = Some(held);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BehaviorFrame
// ─────────────────────────────────────────────────────────────────────────────

/// One stack entry: the behavior and its private resume context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BehaviorFrame {
    Avoid(AvoidContext),
    Search(SearchContext),
    PickUp(PickUpContext),
    Drop(DropContext),
}

impl BehaviorFrame {
    /// A frame of `kind` with a fresh context.
    pub fn fresh(kind: BehaviorKind, config: &BehaviorConfig) -> Self {
        match kind {
            BehaviorKind::Avoid => BehaviorFrame::Avoid(AvoidContext::default()),
            BehaviorKind::Search => BehaviorFrame::Search(SearchContext::default()),
            BehaviorKind::PickUp => BehaviorFrame::PickUp(PickUpContext::new(config)),
            BehaviorKind::Drop => BehaviorFrame::Drop(DropContext::new(config)),
        }
    }

    pub fn kind(&self) -> BehaviorKind {
        match self {
            BehaviorFrame::Avoid(_) => BehaviorKind::Avoid,
            BehaviorFrame::Search(_) => BehaviorKind::Search,
            BehaviorFrame::PickUp(_) => BehaviorKind::PickUp,
            BehaviorFrame::Drop(_) => BehaviorKind::Drop,
        }
    }

    /// Run the behavior for one tick, updating its resume context.
    pub fn step(&mut self, input: &BehaviorInput<'_>) -> BehaviorOutput {
        match self {
            BehaviorFrame::Avoid(ctx) => avoid::step(input, ctx),
            BehaviorFrame::Search(ctx) => search::step(input, ctx),
            BehaviorFrame::PickUp(ctx) => pickup::step(input, ctx),
            BehaviorFrame::Drop(ctx) => dropoff::step(input, ctx),
        }
    }
}
