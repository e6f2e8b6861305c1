//! `rover-perception` – turns asynchronously arriving sensor data into the
//! consistent per-tick picture the behaviors decide on.
//!
//! # Modules
//!
//! - [`cell`] – [`StateCell`][cell::StateCell]: an owned, synchronized value
//!   that only supports "write a new value" and "read a copy".
//! - [`aggregator`] – [`SensorAggregator`][aggregator::SensorAggregator]:
//!   one cell per sensor class (proximity, odometry, encoders) and the
//!   point-in-time [`Snapshot`][aggregator::Snapshot] handed to each tick.
//! - [`targets`] – [`TargetClassifier`][targets::TargetClassifier]: splits
//!   fiducial detections into home markers and cubes, counts sightings, and
//!   tracks the yaw error to the closest cube.
//!
//! Producers may live on any thread; every entity is independently
//! consistent and no operation spans more than one lock.

pub mod aggregator;
pub mod cell;
pub mod targets;

pub use aggregator::{SensorAggregator, SensorSettings, Snapshot};
pub use cell::StateCell;
pub use targets::{TargetClassifier, TargetState};
