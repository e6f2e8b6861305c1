//! Behavior stack: a push-down automaton over [`BehaviorFrame`]s.
//!
//! The top frame is the active behavior; frames beneath it are suspended with
//! their resume contexts intact.  The stack is never empty: `Search` is the
//! base, and popping the last frame reinstates a fresh one.
//!
//! # Arbitration
//!
//! Each tick runs in two phases against one [`Snapshot`]:
//!
//! 1. **Interrupt / resolve** – [`interrupt_request`], a pure function of the
//!    top kind and the snapshot, decides whether `Avoid` must be pushed (any
//!    reading below threshold while avoidance is enabled) or popped (every
//!    reading clear again).
//! 2. **Step** – the top frame runs and its own [`TransitionRequest`] is
//!    validated by [`BehaviorStack::apply`].
//!
//! Invalid requests are logged and ignored.  The stack is left untouched.
//!
//! # Example
//!
//! ```rust
//! use rover_perception::Snapshot;
//! use rover_runtime::behaviors::TransitionRequest;
//! use rover_runtime::stack::interrupt_request;
//! use rover_types::{BehaviorKind, ProximityTriad};
//!
//! let snapshot = Snapshot {
//!     proximity: Some(ProximityTriad {
//!         left: 0.05,
//!         center: 1.0,
//!         right: 1.0,
//!         min_distance: 0.2,
//!         avoidance_enabled: true,
//!     }),
//!     ..Snapshot::empty()
//! };
//! assert_eq!(
//!     interrupt_request(BehaviorKind::Search, &snapshot),
//!     TransitionRequest::PushChild(BehaviorKind::Avoid),
//! );
//! assert_eq!(interrupt_request(BehaviorKind::Avoid, &snapshot), TransitionRequest::None);
//! ```

use rover_perception::Snapshot;
use rover_types::{BehaviorKind, DriveCommand, RoverError};
use tracing::{debug, info, warn};

use crate::behaviors::{
    BehaviorConfig, BehaviorFrame, BehaviorInput, SearchContext, TransitionRequest,
};

// ─────────────────────────────────────────────────────────────────────────────
// Pure arbitration
// ─────────────────────────────────────────────────────────────────────────────

/// The stack-level transition forced by the proximity picture.
///
/// - `PushChild(Avoid)` when avoidance is required and `top` is not `Avoid`.
/// - `PopSelf` when `top` is `Avoid` and avoidance is no longer required.
/// - `None` otherwise, including when no proximity data exists.
pub fn interrupt_request(top: BehaviorKind, snapshot: &Snapshot) -> TransitionRequest {
    let avoid = snapshot
        .proximity
        .is_some_and(|triad| triad.requires_avoidance());
    match (top, avoid) {
        (BehaviorKind::Avoid, true) => TransitionRequest::None,
        (BehaviorKind::Avoid, false) => TransitionRequest::PopSelf,
        (_, true) => TransitionRequest::PushChild(BehaviorKind::Avoid),
        (_, false) => TransitionRequest::None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StackOutcome
// ─────────────────────────────────────────────────────────────────────────────

/// What one [`BehaviorStack::tick`] produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackOutcome {
    /// Drive command, clamped to `max_cmd`.
    pub command: DriveCommand,
    /// Possession change reported by the stepped behavior.
    pub possession: Option<bool>,
    /// The request the stepped behavior made, whether or not it was valid.
    pub requested: TransitionRequest,
    /// Top of the stack after the tick.
    pub active: BehaviorKind,
}

// ─────────────────────────────────────────────────────────────────────────────
// BehaviorStack
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered behavior frames; the last element is the active one.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorStack {
    frames: Vec<BehaviorFrame>,
}

impl BehaviorStack {
    /// A stack holding a single fresh `Search` frame.
    pub fn new() -> Self {
        Self {
            frames: vec![BehaviorFrame::Search(SearchContext::default())],
        }
    }

    /// Kind of the active frame.
    pub fn top(&self) -> BehaviorKind {
        self.frames
            .last()
            .map(BehaviorFrame::kind)
            .unwrap_or(BehaviorKind::Search)
    }

    /// Frame kinds from bottom to top.
    pub fn kinds(&self) -> Vec<BehaviorKind> {
        self.frames.iter().map(BehaviorFrame::kind).collect()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames from bottom to top, with their resume contexts.
    pub fn frames(&self) -> &[BehaviorFrame] {
        &self.frames
    }

    /// Apply a behavior's transition request.
    ///
    /// `has_cube` is the possession state in force after the behavior's own
    /// possession report.  Rejected requests leave the stack untouched.
    ///
    /// # Errors
    ///
    /// [`RoverError::InvalidTransition`] when the request is not allowed:
    /// pushing `Avoid` (interrupt only) or `Search` (base only), pushing
    /// `PickUp` while holding a cube, pushing `Drop` without one, or pushing
    /// the kind that is already active.
    pub fn apply(
        &mut self,
        request: TransitionRequest,
        has_cube: bool,
        config: &BehaviorConfig,
    ) -> Result<(), RoverError> {
        let active = self.top();
        match request {
            TransitionRequest::None => Ok(()),
            TransitionRequest::PopSelf => {
                self.pop();
                Ok(())
            }
            TransitionRequest::PushChild(kind) => {
                let allowed = match kind {
                    BehaviorKind::Avoid | BehaviorKind::Search => false,
                    BehaviorKind::PickUp => !has_cube,
                    BehaviorKind::Drop => has_cube,
                } && kind != active;
                if !allowed {
                    return Err(RoverError::InvalidTransition {
                        active,
                        requested: request.to_string(),
                    });
                }
                self.frames.push(BehaviorFrame::fresh(kind, config));
                info!(from = %active, to = %kind, depth = self.depth(), "behavior pushed");
                Ok(())
            }
        }
    }

    /// Run one tick: arbitrate, step the active behavior, apply its request.
    ///
    /// Without proximity data the stack is left alone and `STOP` is returned.
    pub fn tick(&mut self, input: &BehaviorInput<'_>) -> StackOutcome {
        let config = input.config;
        if !input.snapshot.is_ready() {
            return StackOutcome {
                command: DriveCommand::STOP,
                possession: None,
                requested: TransitionRequest::None,
                active: self.top(),
            };
        }

        self.arbitrate(input.snapshot, config);

        let out = match self.frames.last_mut() {
            Some(frame) => frame.step(input),
            None => {
                self.frames.push(BehaviorFrame::Search(SearchContext::default()));
                return StackOutcome {
                    command: DriveCommand::STOP,
                    possession: None,
                    requested: TransitionRequest::None,
                    active: BehaviorKind::Search,
                };
            }
        };

        let has_cube = out.possession.unwrap_or(input.targets.has_cube);
        if let Err(e) = self.apply(out.transition, has_cube, config) {
            warn!(error = %e, "transition request ignored");
        }

        let command = DriveCommand::clamped(out.command.left, out.command.right, config.max_cmd);
        debug!(
            active = %self.top(),
            left = command.left,
            right = command.right,
            "stack ticked"
        );
        StackOutcome {
            command,
            possession: out.possession,
            requested: out.transition,
            active: self.top(),
        }
    }

    fn arbitrate(&mut self, snapshot: &Snapshot, config: &BehaviorConfig) {
        match interrupt_request(self.top(), snapshot) {
            TransitionRequest::PushChild(BehaviorKind::Avoid) => {
                let interrupted = self.top();
                self.frames.push(BehaviorFrame::fresh(BehaviorKind::Avoid, config));
                info!(interrupted = %interrupted, "avoidance interrupt");
            }
            TransitionRequest::PopSelf => {
                while interrupt_request(self.top(), snapshot) == TransitionRequest::PopSelf {
                    self.frames.pop();
                }
                if self.frames.is_empty() {
                    self.frames.push(BehaviorFrame::Search(SearchContext::default()));
                }
                info!(resumed = %self.top(), "avoidance resolved");
            }
            _ => {}
        }
    }

    fn pop(&mut self) {
        let popped = self.frames.pop().map(|f| f.kind());
        if self.frames.is_empty() {
            debug!("stack emptied; reinstating search");
            self.frames.push(BehaviorFrame::Search(SearchContext::default()));
        }
        if let Some(kind) = popped {
            info!(popped = %kind, resumed = %self.top(), "behavior popped");
        }
    }
}

impl Default for BehaviorStack {
    fn default() -> Self {
        Self::new()
    }
}
