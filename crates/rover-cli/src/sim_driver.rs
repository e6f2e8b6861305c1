//! Sensor producer backed by [`SimArena`].
//!
//! Runs on its own thread at the tick period: applies the latest drive
//! command from the bus, then writes proximity, odometry, encoders and tag
//! detections into the shared aggregator and classifier, exactly as the real
//! sensor drivers would from their callbacks.
//!
//! Possession is reconciled with the arena every step.  When the controller
//! reports a grab the arena tries to pick up a cube; when it reports a drop
//! the arena tries to deposit at home.  A report the arena cannot honour is
//! written back to the classifier.  This write-back stands in for the
//! gripper feedback real hardware would provide; the behaviors remain the
//! only writers of possession on the control side.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rover_hal::SimArena;
use rover_middleware::{EventBus, Topic, TopicReceiver};
use rover_perception::{SensorAggregator, TargetClassifier};
use rover_types::{DriveCommand, EventPayload, Pose, TagDetection};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::SimConfig;

pub struct SimDriver {
    arena: SimArena,
    config: SimConfig,
    sensors: Arc<SensorAggregator>,
    targets: Arc<TargetClassifier>,
    drive: TopicReceiver,
    command: DriveCommand,
}

impl SimDriver {
    /// Build the arena from `config`.  Simulated proximity rays are as long
    /// as the aggregator's maximum range.
    pub fn new(
        config: &SimConfig,
        bus: &EventBus,
        sensors: Arc<SensorAggregator>,
        targets: Arc<TargetClassifier>,
    ) -> Self {
        let arena = config.cubes.iter().fold(
            SimArena::new(config.half_extent)
                .with_home(config.home.0, config.home.1)
                .with_pose(Pose::new(config.start.0, config.start.1, 0.0))
                .with_sensor_range(sensors.max_range()),
            |arena, c| arena.with_cube(c.id, c.x, c.y),
        );
        Self {
            arena,
            config: config.clone(),
            sensors,
            targets,
            drive: bus.subscribe_to(Topic::DriveCommands),
            command: DriveCommand::STOP,
        }
    }

    pub fn arena(&self) -> &SimArena {
        &self.arena
    }

    /// Advance the arena by `dt` seconds and publish fresh readings.
    pub fn step(&mut self, dt: f32) {
        self.drain_commands();
        self.arena.apply(self.command, dt);
        self.sync_possession();

        for (side, distance) in self.arena.proximity() {
            self.sensors.update_proximity(side, distance);
        }
        let odom = self.arena.odometry();
        self.sensors
            .update_odometry(odom.pose, odom.linear_velocity, odom.angular_velocity);
        let counts = self.arena.encoders();
        self.sensors.update_encoders(counts.left, counts.right);

        let detections: Vec<TagDetection> = self
            .arena
            .detections(self.config.camera_fov, self.config.camera_range)
            .iter()
            .map(|d| self.targets.classify(d.id, d.bearing, d.distance))
            .collect();
        self.targets.ingest(&detections);
    }

    /// Keep only the newest drive command.
    fn drain_commands(&mut self) {
        loop {
            match self.drive.try_recv() {
                Ok(event) => {
                    if let EventPayload::Drive(cmd) = event.payload {
                        self.command = cmd;
                    }
                }
                Err(TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, "sim fell behind the drive topic");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    fn sync_possession(&mut self) {
        let reported = self.targets.has_cube();
        match (reported, self.arena.carrying()) {
            (true, None) => match self.arena.grab(self.config.grab_within) {
                Some(id) => info!(cube = id, "cube picked up"),
                None => {
                    warn!("grab reported with no cube in reach");
                    self.targets.set_has_cube(false);
                }
            },
            (false, Some(id)) => {
                if self.arena.deposit(self.config.deposit_within) {
                    info!(cube = id, delivered = self.arena.delivered(), "cube delivered");
                } else {
                    warn!(cube = id, "drop reported away from home");
                    self.targets.set_has_cube(true);
                }
            }
            _ => {}
        }
    }
}

/// Run `driver` every `period` on a dedicated thread until `stop` turns
/// `true` or its sender goes away.  The thread hands the arena back.
pub fn spawn(
    mut driver: SimDriver,
    period: Duration,
    stop: watch::Receiver<bool>,
) -> std::io::Result<JoinHandle<SimArena>> {
    thread::Builder::new().name("sim".to_string()).spawn(move || {
        let dt = period.as_secs_f32();
        while !*stop.borrow() && stop.has_changed().is_ok() {
            driver.step(dt);
            thread::sleep(period);
        }
        driver.arena
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CubeSpawn;
    use rover_perception::SensorSettings;
    use rover_types::{Event, TagRole};

    type Parts = (SimDriver, EventBus, Arc<SensorAggregator>, Arc<TargetClassifier>);

    fn driver(config: SimConfig) -> Parts {
        let bus = EventBus::default();
        let sensors = Arc::new(SensorAggregator::default());
        let targets = Arc::new(TargetClassifier::default());
        let d = SimDriver::new(&config, &bus, Arc::clone(&sensors), Arc::clone(&targets));
        (d, bus, sensors, targets)
    }

    #[test]
    fn first_step_makes_the_snapshot_ready() {
        let (mut d, _bus, sensors, _) = driver(SimConfig::default());
        assert!(!sensors.snapshot().is_ready());
        d.step(0.1);
        let snap = sensors.snapshot();
        assert!(snap.is_ready());
        assert!(snap.odometry.is_some());
        assert!(snap.encoders.is_some());
    }

    #[test]
    fn proximity_rays_follow_the_aggregator_range() {
        let bus = EventBus::default();
        let settings = SensorSettings {
            max_range: 1.0,
            ..SensorSettings::default()
        };
        let sensors = Arc::new(SensorAggregator::new(settings));
        let targets = Arc::new(TargetClassifier::default());
        let mut d = SimDriver::new(&SimConfig::default(), &bus, Arc::clone(&sensors), targets);
        d.step(0.1);
        let triad = sensors.snapshot().proximity.unwrap();
        assert_eq!((triad.left, triad.center, triad.right), (1.0, 1.0, 1.0));
    }

    #[test]
    fn latest_drive_command_moves_the_arena() {
        let (mut d, bus, sensors, _) = driver(SimConfig::default());
        for cmd in [DriveCommand::STOP, DriveCommand { left: 200.0, right: 200.0 }] {
            bus.publish_to(Topic::DriveCommands, Event::new("test", EventPayload::Drive(cmd)))
                .unwrap();
        }
        d.step(0.5);
        let pose = sensors.snapshot().pose().unwrap();
        assert!(pose.x > SimConfig::default().start.0);
    }

    #[test]
    fn detections_go_through_the_classifier() {
        let config = SimConfig {
            cubes: vec![CubeSpawn { id: 9, x: 1.5, y: 0.0 }],
            home: (-2.0, 0.0),
            ..SimConfig::default()
        };
        let (mut d, _bus, _, targets) = driver(config);
        d.step(0.1);
        let state = targets.snapshot();
        assert_eq!(state.cubes.len(), 1);
        assert_eq!(state.cubes[0].role, TagRole::Cube);
        assert!(state.center_markers.is_empty(), "home is behind the camera");
    }

    #[test]
    fn reported_grab_without_a_cube_in_reach_is_undone() {
        let (mut d, _bus, _, targets) = driver(SimConfig::default());
        targets.set_has_cube(true);
        d.step(0.1);
        assert!(!targets.has_cube());
        assert_eq!(d.arena().carrying(), None);
    }

    #[test]
    fn grab_and_deposit_follow_reported_possession() {
        let config = SimConfig {
            start: (0.3, 0.0),
            cubes: vec![CubeSpawn { id: 4, x: 0.45, y: 0.0 }],
            ..SimConfig::default()
        };
        let (mut d, _bus, _, targets) = driver(config);

        targets.set_has_cube(true);
        d.step(0.1);
        assert_eq!(d.arena().carrying(), Some(4));

        // Start is within deposit reach of home at the origin.
        targets.set_has_cube(false);
        d.step(0.1);
        assert_eq!(d.arena().carrying(), None);
        assert_eq!(d.arena().delivered(), 1);
    }
}
