//! In-process simulated arena for running the control core without hardware.
//!
//! [`SimArena`] models a square walled arena with a differential-drive rover,
//! a set of cubes and a single home marker.  It produces the same raw inputs
//! the real drivers would (three proximity readings, odometry, encoder
//! counts, tag detections) and consumes [`DriveCommand`]s.
//!
//! # Example
//!
//! ```rust
//! use rover_hal::sim::SimArena;
//! use rover_types::DriveCommand;
//!
//! let mut arena = SimArena::new(2.0)
//!     .with_cube(7, 1.0, 0.0)
//!     .with_home(0.0, 0.0);
//!
//! arena.apply(DriveCommand { left: 100.0, right: 100.0 }, 0.1);
//! assert!(arena.odometry().pose.x > 0.0);
//! ```

use std::f32::consts::FRAC_PI_4;

use rover_types::{
    DEFAULT_CENTER_MARKER_ID, DriveCommand, EncoderCounts, OdometryState, Pose, ProximitySide,
    TagDetection, TagRole, normalize_angle,
};
use tracing::debug;

/// Motor-command units to wheel speed (m/s).  255 → ~0.3 m/s.
const SPEED_PER_CMD: f32 = 0.3 / 255.0;
/// Distance between the wheels (metres).
const WHEEL_BASE: f32 = 0.28;
/// Encoder resolution.
const TICKS_PER_METRE: f32 = 2000.0;
/// Keep the rover's centre this far from the walls.
const BODY_RADIUS: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SimCube {
    id: u32,
    x: f32,
    y: f32,
}

/// Kinematic arena.  See the [module docs][self].
#[derive(Debug, Clone)]
pub struct SimArena {
    half_extent: f32,
    sensor_range: f32,
    pose: Pose,
    linear_velocity: f32,
    angular_velocity: f32,
    encoder_travel: (f32, f32),
    cubes: Vec<SimCube>,
    home: (f32, f32),
    carrying: Option<u32>,
    delivered: u32,
}

impl SimArena {
    /// An empty arena spanning `[-half_extent, half_extent]` on both axes,
    /// with the rover at the origin facing +X.
    pub fn new(half_extent: f32) -> Self {
        Self {
            half_extent: half_extent.abs().max(BODY_RADIUS * 2.0),
            sensor_range: 3.0,
            pose: Pose::default(),
            linear_velocity: 0.0,
            angular_velocity: 0.0,
            encoder_travel: (0.0, 0.0),
            cubes: Vec::new(),
            home: (0.0, 0.0),
            carrying: None,
            delivered: 0,
        }
    }

    pub fn with_cube(mut self, id: u32, x: f32, y: f32) -> Self {
        self.cubes.push(SimCube { id, x, y });
        self
    }

    pub fn with_home(mut self, x: f32, y: f32) -> Self {
        self.home = (x, y);
        self
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    /// Maximum distance the proximity sensors report (metres).
    pub fn with_sensor_range(mut self, range: f32) -> Self {
        self.sensor_range = range.abs();
        self
    }

    // ── Actuation ────────────────────────────────────────────────────────────

    /// Integrate `cmd` over `dt` seconds.
    pub fn apply(&mut self, cmd: DriveCommand, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let v_left = cmd.left * SPEED_PER_CMD;
        let v_right = cmd.right * SPEED_PER_CMD;
        self.linear_velocity = (v_left + v_right) * 0.5;
        self.angular_velocity = (v_right - v_left) / WHEEL_BASE;

        let heading = self.pose.theta + self.angular_velocity * dt * 0.5;
        let limit = self.half_extent - BODY_RADIUS;
        let step = self.linear_velocity * dt;
        self.pose.x = (self.pose.x + step * heading.cos()).clamp(-limit, limit);
        self.pose.y = (self.pose.y + step * heading.sin()).clamp(-limit, limit);
        self.pose.theta = normalize_angle(self.pose.theta + self.angular_velocity * dt);

        self.encoder_travel.0 += v_left * dt;
        self.encoder_travel.1 += v_right * dt;
    }

    /// Pick up the nearest free cube within `within` metres, if any.
    pub fn grab(&mut self, within: f32) -> Option<u32> {
        if self.carrying.is_some() {
            return None;
        }
        let (idx, _) = self
            .cubes
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.distance_to(c.x, c.y)))
            .filter(|(_, d)| *d <= within)
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        let cube = self.cubes.remove(idx);
        debug!(cube = cube.id, "sim: cube grabbed");
        self.carrying = Some(cube.id);
        Some(cube.id)
    }

    /// Deposit the carried cube if the rover is within `within` metres of home.
    pub fn deposit(&mut self, within: f32) -> bool {
        if self.carrying.is_none() || self.distance_to(self.home.0, self.home.1) > within {
            return false;
        }
        let id = self.carrying.take();
        self.delivered += 1;
        debug!(cube = ?id, delivered = self.delivered, "sim: cube deposited");
        true
    }

    // ── Sensing ──────────────────────────────────────────────────────────────

    /// Range to the nearest wall along each sensor axis.  The side sensors
    /// look 45° either side of the heading.
    pub fn proximity(&self) -> [(ProximitySide, f32); 3] {
        ProximitySide::ALL.map(|side| {
            let offset = match side {
                ProximitySide::Left => FRAC_PI_4,
                ProximitySide::Center => 0.0,
                ProximitySide::Right => -FRAC_PI_4,
            };
            (side, self.ray_to_wall(self.pose.theta + offset))
        })
    }

    pub fn odometry(&self) -> OdometryState {
        OdometryState {
            pose: self.pose,
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
        }
    }

    pub fn encoders(&self) -> EncoderCounts {
        EncoderCounts {
            left: (self.encoder_travel.0 * TICKS_PER_METRE) as i64,
            right: (self.encoder_travel.1 * TICKS_PER_METRE) as i64,
        }
    }

    /// Every tag inside the camera cone: `|bearing| <= fov / 2` and
    /// `distance <= range`.  A carried cube is not visible.
    pub fn detections(&self, fov: f32, range: f32) -> Vec<TagDetection> {
        let half_fov = fov.abs() * 0.5;
        let cubes = self
            .cubes
            .iter()
            .map(|c| (c.id, TagRole::Cube, c.x, c.y));
        let home = std::iter::once((
            DEFAULT_CENTER_MARKER_ID,
            TagRole::CenterMarker,
            self.home.0,
            self.home.1,
        ));

        cubes
            .chain(home)
            .filter_map(|(id, role, x, y)| {
                let distance = self.distance_to(x, y);
                let bearing =
                    normalize_angle((y - self.pose.y).atan2(x - self.pose.x) - self.pose.theta);
                (distance <= range && bearing.abs() <= half_fov)
                    .then(|| TagDetection::new(id, bearing, distance, role))
            })
            .collect()
    }

    pub fn carrying(&self) -> Option<u32> {
        self.carrying
    }

    pub fn delivered(&self) -> u32 {
        self.delivered
    }

    pub fn remaining_cubes(&self) -> usize {
        self.cubes.len()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn distance_to(&self, x: f32, y: f32) -> f32 {
        (x - self.pose.x).hypot(y - self.pose.y)
    }

    fn ray_to_wall(&self, angle: f32) -> f32 {
        let (s, c) = angle.sin_cos();
        let h = self.half_extent;
        let along = |pos: f32, dir: f32| {
            if dir > f32::EPSILON {
                (h - pos) / dir
            } else if dir < -f32::EPSILON {
                (-h - pos) / dir
            } else {
                f32::INFINITY
            }
        };
        along(self.pose.x, c)
            .min(along(self.pose.y, s))
            .clamp(0.0, self.sensor_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn straight_drive_moves_forward_and_counts_ticks() {
        let mut arena = SimArena::new(5.0);
        for _ in 0..10 {
            arena.apply(DriveCommand { left: 255.0, right: 255.0 }, 0.1);
        }
        let odom = arena.odometry();
        assert!((odom.pose.x - 0.3).abs() < 1e-3);
        assert!(odom.pose.y.abs() < 1e-5);
        assert!((odom.linear_velocity - 0.3).abs() < 1e-4);
        let enc = arena.encoders();
        assert_eq!(enc.left, enc.right);
        assert!((enc.left - 600).abs() <= 1);
    }

    #[test]
    fn opposite_wheels_turn_in_place() {
        let mut arena = SimArena::new(5.0);
        arena.apply(DriveCommand { left: -100.0, right: 100.0 }, 0.1);
        let odom = arena.odometry();
        assert!(odom.pose.theta > 0.0, "right wheel forward turns left");
        assert!(odom.pose.x.abs() < 1e-6);
    }

    #[test]
    fn rover_is_kept_inside_the_walls() {
        let mut arena = SimArena::new(0.5);
        for _ in 0..100 {
            arena.apply(DriveCommand { left: 255.0, right: 255.0 }, 0.1);
        }
        assert!(arena.odometry().pose.x <= 0.5 - BODY_RADIUS + 1e-6);
    }

    #[test]
    fn proximity_measures_distance_to_walls() {
        let arena = SimArena::new(1.0).with_pose(Pose::new(0.5, 0.0, 0.0));
        let readings = arena.proximity();
        let center = readings[1];
        assert_eq!(center.0, ProximitySide::Center);
        assert!((center.1 - 0.5).abs() < 1e-5);
        // 45° left: hits x = 1 after 0.5/cos45 ≈ 0.707, y wall after 1/sin45 ≈ 1.414.
        assert!((readings[0].1 - 0.7071).abs() < 1e-3);
    }

    #[test]
    fn proximity_is_capped_at_sensor_range() {
        let arena = SimArena::new(10.0).with_sensor_range(1.5);
        assert!(arena.proximity().iter().all(|(_, d)| *d <= 1.5));
    }

    #[test]
    fn detections_respect_field_of_view_and_range() {
        let arena = SimArena::new(5.0)
            .with_cube(1, 1.0, 0.1)
            .with_cube(2, 0.0, 1.0) // 90° to the left, outside the cone
            .with_cube(3, 4.0, 0.0) // too far
            .with_home(-1.0, 0.0); // behind
        let seen = arena.detections(1.0, 2.0);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, 1);
        assert!(seen[0].bearing > 0.0);

        let turned = arena.with_pose(Pose::new(0.0, 0.0, FRAC_PI_2));
        let ids: Vec<u32> = turned.detections(1.0, 2.0).iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn grab_and_deposit_cycle() {
        let mut arena = SimArena::new(5.0)
            .with_cube(4, 0.1, 0.0)
            .with_home(0.0, 0.2);
        assert_eq!(arena.grab(0.05), None);
        assert_eq!(arena.grab(0.2), Some(4));
        assert_eq!(arena.carrying(), Some(4));
        assert_eq!(arena.remaining_cubes(), 0);
        // Carried cube is no longer visible; home is out of the cone.
        assert!(arena.detections(1.0, 3.0).is_empty());

        assert!(!arena.deposit(0.1));
        assert!(arena.deposit(0.3));
        assert_eq!(arena.delivered(), 1);
        assert_eq!(arena.carrying(), None);
    }
}
