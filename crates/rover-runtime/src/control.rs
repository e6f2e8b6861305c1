//! [`ControlContext`] – the value threaded through every tick.
//!
//! All controller state that survives between ticks lives here: the current
//! [`Mode`], the behavior stack, and the tick counter.  Nothing is global;
//! each operation takes the context by value and hands back the updated one.
//!
//! | Mode | Tick | Joystick | Classifier |
//! |---|---|---|---|
//! | `ManualLow` / `ManualHigh` | no command | mapped to a drive command | disabled |
//! | `AutoRun` | stack ticked, one command | ignored | enabled |
//! | `AutoPaused` | `STOP`, stack kept | ignored | enabled |
//!
//! The stack is created the first time an autonomous mode is entered and
//! is preserved, not reset, when the rover drops back to manual.
//!
//! # Example
//!
//! ```rust
//! use rover_perception::{Snapshot, TargetClassifier};
//! use rover_runtime::control::{ControlContext, ControlSettings};
//! use rover_types::Mode;
//!
//! let targets = TargetClassifier::default();
//! let settings = ControlSettings::default();
//! let ctx = ControlContext::default().with_mode(Mode::AutoRun, &targets);
//!
//! // No proximity data yet: the stack refuses to move the rover.
//! let (ctx, cmd) = ctx.tick(Snapshot::empty(), &targets, &settings, std::time::Instant::now());
//! assert_eq!(cmd.map(|c| c.is_stop()), Some(true));
//! assert_eq!(ctx.ticks(), 1);
//! ```

use std::time::{Duration, Instant};

use rover_hal::{JoystickAxes, JoystickMapper};
use rover_perception::{Snapshot, TargetClassifier};
use rover_types::{BehaviorKind, DriveCommand, Mode, ModeTable, RoverError};
use tracing::{debug, debug_span, info, warn};

use crate::behaviors::{BehaviorConfig, BehaviorInput};
use crate::stack::BehaviorStack;

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed parameters of the tick function.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSettings {
    pub behavior: BehaviorConfig,
    /// Proximity data older than this is treated as missing.  Zero disables
    /// the check.
    pub stale_after: Duration,
    /// Tick period in seconds, handed to the behaviors as `dt`.
    pub dt: f32,
}

impl ControlSettings {
    pub fn new(behavior: BehaviorConfig, tick_period: Duration) -> Self {
        Self {
            behavior,
            stale_after: Duration::ZERO,
            dt: tick_period.as_secs_f32(),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self::new(BehaviorConfig::default(), Duration::from_millis(100))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlContext
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ControlContext {
    mode: Mode,
    stack: Option<BehaviorStack>,
    ticks: u64,
    proximity_stale: bool,
}

impl ControlContext {
    /// Context starting in `mode`.  Call [`with_mode`][Self::with_mode]
    /// instead when the classifier must follow the mode.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            stack: mode.is_autonomous().then(BehaviorStack::new),
            ticks: 0,
            proximity_stale: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The behavior stack, once an autonomous mode has been entered.
    pub fn stack(&self) -> Option<&BehaviorStack> {
        self.stack.as_ref()
    }

    /// Kind of the active behavior, if a stack exists.
    pub fn active_behavior(&self) -> Option<BehaviorKind> {
        self.stack.as_ref().map(BehaviorStack::top)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Switch to `mode`, enabling the classifier for autonomous modes and
    /// disabling it for manual ones.  Entering an autonomous mode without a
    /// stack creates `[Search]`; an existing stack is kept.
    pub fn with_mode(mut self, mode: Mode, targets: &TargetClassifier) -> Self {
        targets.set_enabled(mode.is_autonomous());
        if mode.is_autonomous() && self.stack.is_none() {
            self.stack = Some(BehaviorStack::new());
        }
        if mode != self.mode {
            info!(from = ?self.mode, to = ?mode, "mode changed");
        }
        self.mode = mode;
        self
    }

    /// Resolve a raw operator mode code and switch to it.  Unknown codes are
    /// logged and the current mode is kept.
    pub fn apply_mode_code(self, code: u8, table: &ModeTable, targets: &TargetClassifier) -> Self {
        match table.resolve(code) {
            Ok(mode) => self.with_mode(mode, targets),
            Err(e) => {
                warn!(error = %e, current = ?self.mode, "mode code ignored");
                self
            }
        }
    }

    /// Map a joystick event.  Only manual modes produce a command.
    pub fn joystick(&self, axes: JoystickAxes, mapper: &JoystickMapper) -> Option<DriveCommand> {
        if !self.mode.is_manual() {
            debug!(mode = ?self.mode, "joystick ignored in autonomous mode");
            return None;
        }
        Some(mapper.map(axes))
    }

    /// Run one control tick against `snapshot`.
    ///
    /// Returns the command to publish, or `None` in manual modes where the
    /// joystick owns the wheels.  A possession change reported by PickUp or
    /// Drop is written to `targets` before returning.
    pub fn tick(
        mut self,
        snapshot: Snapshot,
        targets: &TargetClassifier,
        settings: &ControlSettings,
        now: Instant,
    ) -> (Self, Option<DriveCommand>) {
        self.ticks += 1;
        let span = debug_span!("tick", tick = self.ticks, mode = ?self.mode);
        let _enter = span.enter();

        match self.mode {
            Mode::ManualLow | Mode::ManualHigh => return (self, None),
            Mode::AutoPaused => return (self, Some(DriveCommand::STOP)),
            Mode::AutoRun => {}
        }

        let snapshot = self.check_freshness(snapshot, settings.stale_after, now);
        let target_state = targets.snapshot();
        let input = BehaviorInput {
            snapshot: &snapshot,
            targets: &target_state,
            config: &settings.behavior,
            dt: settings.dt,
        };

        let outcome = self.stack.get_or_insert_with(BehaviorStack::new).tick(&input);
        if let Some(held) = outcome.possession {
            targets.set_has_cube(held);
            info!(has_cube = held, "possession changed");
        }
        (self, Some(outcome.command))
    }

    /// Drop a stale proximity triad, logging on each change of freshness.
    fn check_freshness(
        &mut self,
        snapshot: Snapshot,
        stale_after: Duration,
        now: Instant,
    ) -> Snapshot {
        if snapshot.proximity.is_none() || snapshot.proximity_fresh(now, stale_after) {
            if self.proximity_stale && snapshot.proximity.is_some() {
                info!("proximity data fresh again");
            }
            self.proximity_stale = false;
            return snapshot;
        }
        if !self.proximity_stale {
            let error = RoverError::SensorUnavailable("proximity".to_string());
            warn!(
                %error,
                stale_after_ms = stale_after.as_millis() as u64,
                "proximity data stale; stopping"
            );
        }
        self.proximity_stale = true;
        snapshot.without_proximity()
    }
}

impl Default for ControlContext {
    fn default() -> Self {
        Self::new(Mode::ManualLow)
    }
}
