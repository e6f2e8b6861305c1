//! [`RoverLoop`] – the fixed-period controller task.
//!
//! One async task multiplexes everything the controller reacts to:
//!
//! - the tick interval: snapshot the sensors, tick the [`ControlContext`],
//!   publish the resulting command on [`Topic::DriveCommands`];
//! - the status interval: publish `"online"` on [`Topic::Status`];
//! - the heartbeat interval: publish `""` on [`Topic::Heartbeat`];
//! - operator events on [`Topic::Operator`]: mode codes and joystick axes;
//! - a `watch` shutdown flag.
//!
//! Branches run to completion, so a shutdown request is only observed
//! between them and never splits a tick.  Sensor producers write into the
//! shared [`SensorAggregator`] and [`TargetClassifier`] from their own
//! threads; the loop only ever reads them through one snapshot per tick.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rover_middleware::EventBus;
//! use rover_perception::{SensorAggregator, TargetClassifier};
//! use rover_runtime::control::ControlContext;
//! use rover_runtime::tick_loop::{RoverLoop, RoverLoopConfig};
//!
//! # async fn demo() {
//! let bus = EventBus::default();
//! let sensors = Arc::new(SensorAggregator::default());
//! let targets = Arc::new(TargetClassifier::default());
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!
//! let rover = RoverLoop::new(RoverLoopConfig::default(), bus, sensors, targets);
//! let final_ctx = rover.run(ControlContext::default(), shutdown).await;
//! # let _ = final_ctx;
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use rover_hal::{JoystickAxes, JoystickMapper};
use rover_middleware::{EventBus, Topic, TopicReceiver};
use rover_perception::{SensorAggregator, TargetClassifier};
use rover_types::{DriveCommand, Event, EventPayload, ModeTable};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::control::{ControlContext, ControlSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`RoverLoop`].
#[derive(Debug, Clone)]
pub struct RoverLoopConfig {
    /// Rover name, used as the prefix of every published event's `source`.
    pub name: String,
    pub tick_period: Duration,
    pub status_interval: Duration,
    pub heartbeat_interval: Duration,
    pub control: ControlSettings,
    pub modes: ModeTable,
    pub joystick: JoystickMapper,
}

impl Default for RoverLoopConfig {
    fn default() -> Self {
        let tick_period = Duration::from_millis(100);
        Self {
            name: "rover".to_string(),
            tick_period,
            status_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(2),
            control: ControlSettings::new(Default::default(), tick_period),
            modes: ModeTable::default(),
            joystick: JoystickMapper::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RoverLoop
// ─────────────────────────────────────────────────────────────────────────────

pub struct RoverLoop {
    config: RoverLoopConfig,
    bus: EventBus,
    sensors: Arc<SensorAggregator>,
    targets: Arc<TargetClassifier>,
    /// Subscribed at construction so operator events published before
    /// [`run`][Self::run] starts are not lost.
    operator: TopicReceiver,
}

impl RoverLoop {
    pub fn new(
        config: RoverLoopConfig,
        bus: EventBus,
        sensors: Arc<SensorAggregator>,
        targets: Arc<TargetClassifier>,
    ) -> Self {
        let operator = bus.subscribe_to(Topic::Operator);
        Self {
            config,
            bus,
            sensors,
            targets,
            operator,
        }
    }

    /// Run until `shutdown` turns `true` or its sender is dropped, then
    /// return the final context.  The classifier is enabled to match the
    /// starting mode before the first tick.
    pub async fn run(
        mut self,
        mut ctx: ControlContext,
        mut shutdown: watch::Receiver<bool>,
    ) -> ControlContext {
        if *shutdown.borrow() {
            return ctx;
        }
        self.targets.set_enabled(ctx.mode().is_autonomous());

        let mut tick = interval(self.config.tick_period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut status = interval(self.config.status_interval);
        status.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut operator_open = true;

        info!(name = %self.config.name, mode = ?ctx.mode(), "rover loop started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    let snapshot = self.sensors.snapshot();
                    let (next, command) =
                        ctx.tick(snapshot, &self.targets, &self.config.control, Instant::now());
                    ctx = next;
                    if let Some(command) = command {
                        self.publish_drive(command);
                    }
                }
                _ = status.tick() => {
                    self.publish(Topic::Status, EventPayload::Status("online".to_string()));
                }
                _ = heartbeat.tick() => {
                    self.publish(Topic::Heartbeat, EventPayload::Heartbeat(String::new()));
                }
                received = self.operator.recv(), if operator_open => match received {
                    Ok(event) => ctx = self.handle_operator(ctx, event),
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "operator events dropped");
                    }
                    Err(RecvError::Closed) => {
                        warn!("operator channel closed");
                        operator_open = false;
                    }
                },
            }
        }

        info!(ticks = ctx.ticks(), "rover loop stopped");
        ctx
    }

    fn handle_operator(&self, ctx: ControlContext, event: Event) -> ControlContext {
        match event.payload {
            EventPayload::ModeCode(code) => {
                ctx.apply_mode_code(code, &self.config.modes, &self.targets)
            }
            EventPayload::Joystick { linear, angular } => {
                let axes = JoystickAxes { linear, angular };
                if let Some(command) = ctx.joystick(axes, &self.config.joystick) {
                    self.publish_drive(command);
                }
                ctx
            }
            other => {
                debug!(payload = ?other, source = %event.source, "unexpected operator event");
                ctx
            }
        }
    }

    fn publish_drive(&self, command: DriveCommand) {
        self.publish(Topic::DriveCommands, EventPayload::Drive(command));
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        let event = Event::new(format!("{}::controller", self.config.name), payload);
        if let Err(e) = self.bus.publish_to(topic, event) {
            warn!(error = %e, ?topic, "publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::ProximitySide;
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    struct Harness {
        bus: EventBus,
        sensors: Arc<SensorAggregator>,
        targets: Arc<TargetClassifier>,
        stop: watch::Sender<bool>,
        handle: JoinHandle<ControlContext>,
    }

    fn start(ctx: ControlContext, clear: bool) -> Harness {
        let bus = EventBus::default();
        let sensors = Arc::new(SensorAggregator::default());
        if clear {
            for side in ProximitySide::ALL {
                sensors.update_proximity(side, 2.0);
            }
        }
        let targets = Arc::new(TargetClassifier::default());
        let rover = RoverLoop::new(
            RoverLoopConfig {
                name: "r1".to_string(),
                ..RoverLoopConfig::default()
            },
            bus.clone(),
            Arc::clone(&sensors),
            Arc::clone(&targets),
        );
        let (stop, shutdown) = watch::channel(false);
        let handle = tokio::spawn(rover.run(ctx, shutdown));
        Harness {
            bus,
            sensors,
            targets,
            stop,
            handle,
        }
    }

    fn auto() -> ControlContext {
        ControlContext::new(rover_types::Mode::AutoRun)
    }

    async fn next_drive(rx: &mut TopicReceiver) -> (String, DriveCommand) {
        loop {
            let event = rx.recv().await.unwrap();
            if let EventPayload::Drive(cmd) = event.payload {
                return (event.source, cmd);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn autonomous_loop_publishes_one_command_per_tick() {
        let h = start(auto(), true);
        let mut drive = h.bus.subscribe_to(Topic::DriveCommands);

        let (source, cmd) = next_drive(&mut drive).await;
        assert_eq!(source, "r1::controller");
        assert!(cmd.left > 0.0 && cmd.left == cmd.right, "search drives straight");

        sleep(Duration::from_millis(1050)).await;
        h.stop.send(true).unwrap();
        let ctx = h.handle.await.unwrap();
        assert!((10..=12).contains(&ctx.ticks()), "ticks = {}", ctx.ticks());
    }

    #[tokio::test(start_paused = true)]
    async fn status_and_heartbeat_are_published() {
        let h = start(ControlContext::default(), false);
        let mut status = h.bus.subscribe_to(Topic::Status);
        let mut heartbeat = h.bus.subscribe_to(Topic::Heartbeat);

        let event = status.recv().await.unwrap();
        assert_eq!(event.payload, EventPayload::Status("online".to_string()));
        let event = heartbeat.recv().await.unwrap();
        assert_eq!(event.payload, EventPayload::Heartbeat(String::new()));

        h.stop.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn joystick_drives_in_manual_mode() {
        let h = start(ControlContext::default(), true);
        let mut drive = h.bus.subscribe_to(Topic::DriveCommands);
        h.bus
            .publish_to(
                Topic::Operator,
                Event::new("operator", EventPayload::Joystick { linear: 0.6, angular: 0.0 }),
            )
            .unwrap();

        let (_, cmd) = next_drive(&mut drive).await;
        assert!((cmd.left - 153.0).abs() < 1e-3);
        assert!((cmd.right - 153.0).abs() < 1e-3);

        h.stop.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_start_disables_the_classifier() {
        let h = start(ControlContext::default(), true);
        let mut drive = h.bus.subscribe_to(Topic::DriveCommands);
        let mut status = h.bus.subscribe_to(Topic::Status);
        status.recv().await.unwrap();
        assert!(!h.targets.is_enabled(), "no tag ingestion before a mode code");

        h.targets.ingest(&[rover_types::TagDetection::cube(1, 0.0, 1.0)]);
        assert_eq!(h.targets.cube_count(), 0);

        h.bus
            .publish_to(Topic::Operator, Event::new("operator", EventPayload::ModeCode(2)))
            .unwrap();
        next_drive(&mut drive).await;
        assert!(h.targets.is_enabled());

        h.stop.send(true).unwrap();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn mode_code_switches_to_autonomous() {
        let h = start(ControlContext::default(), true);
        let mut drive = h.bus.subscribe_to(Topic::DriveCommands);
        h.bus
            .publish_to(Topic::Operator, Event::new("operator", EventPayload::ModeCode(2)))
            .unwrap();

        let (_, cmd) = next_drive(&mut drive).await;
        assert!(cmd.left > 0.0, "autonomous search moves the rover");

        // Obstacle on the left: the next commands turn right.
        h.sensors.update_proximity(ProximitySide::Left, 0.05);
        let (_, cmd) = next_drive(&mut drive).await;
        assert!(cmd.left > cmd.right);

        h.stop.send(true).unwrap();
        let ctx = h.handle.await.unwrap();
        assert_eq!(ctx.mode(), rover_types::Mode::AutoRun);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_start_returns_immediately() {
        let bus = EventBus::default();
        let rover = RoverLoop::new(
            RoverLoopConfig::default(),
            bus,
            Arc::new(SensorAggregator::default()),
            Arc::new(TargetClassifier::default()),
        );
        let (_stop, shutdown) = watch::channel(true);
        let ctx = rover.run(auto(), shutdown).await;
        assert_eq!(ctx.ticks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_shutdown_sender_stops_the_loop() {
        let h = start(auto(), true);
        drop(h.stop);
        let ctx = h.handle.await.unwrap();
        assert!(ctx.ticks() <= 1);
    }
}
