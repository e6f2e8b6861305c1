//! `rover-middleware` – in-process message routing.
//!
//! Carries operator input into the controller and drive commands, status
//! strings and heartbeats out of it, without caring what any of them mean.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
