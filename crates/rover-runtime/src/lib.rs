//! `rover-runtime` – the decision core.
//!
//! # Modules
//!
//! - [`behaviors`] – the four behaviors (Avoid, Search, PickUp, Drop), each
//!   a pure `step(input, context) → output` function over one tick's
//!   [`Snapshot`][rover_perception::Snapshot] and
//!   [`TargetState`][rover_perception::TargetState].
//! - [`stack`] – [`BehaviorStack`][stack::BehaviorStack]: the push-down
//!   automaton that arbitrates between them, with the avoidance interrupt
//!   expressed as the pure [`interrupt_request`][stack::interrupt_request].
//! - [`control`] – [`ControlContext`][control::ControlContext]: mode, stack
//!   and tick count, threaded through each tick and returned.
//! - [`tick_loop`] – [`RoverLoop`][tick_loop::RoverLoop]: the async
//!   fixed-period loop that ties the context to the event bus.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod behaviors;
pub mod control;
pub mod stack;
pub mod telemetry;
pub mod tick_loop;

pub use behaviors::{BehaviorConfig, BehaviorFrame, BehaviorOutput, TransitionRequest};
pub use control::{ControlContext, ControlSettings};
pub use stack::{BehaviorStack, StackOutcome, interrupt_request};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use tick_loop::{RoverLoop, RoverLoopConfig};
