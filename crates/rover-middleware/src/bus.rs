//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Direction | Typical traffic |
//! |---|---|---|
//! | [`Topic::DriveCommands`] | outbound | One wheel command per tick or joystick event |
//! | [`Topic::Operator`] | inbound | Mode codes and joystick axes |
//! | [`Topic::Status`] | outbound | Periodic `"online"` liveness strings |
//! | [`Topic::Heartbeat`] | outbound | Periodic opaque heartbeats |

use rover_types::{Event, RoverError};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Outbound [`DriveCommand`][rover_types::DriveCommand]s.
    DriveCommands,
    /// Inbound operator input: mode codes and joystick axes.
    Operator,
    /// Outbound liveness strings.
    Status,
    /// Outbound heartbeats.
    Heartbeat,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    drive_commands: broadcast::Sender<Event>,
    operator: broadcast::Sender<Event>,
    status: broadcast::Sender<Event>,
    heartbeat: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (drive_commands, _) = broadcast::channel(capacity);
        let (operator, _) = broadcast::channel(capacity);
        let (status, _) = broadcast::channel(capacity);
        let (heartbeat, _) = broadcast::channel(capacity);
        Self {
            drive_commands,
            operator,
            status,
            heartbeat,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when nobody is listening on the topic; an absent
    /// consumer is a normal condition for an outbound lane.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, RoverError> {
        let sender = self.topic_sender(topic);
        if sender.receiver_count() == 0 {
            trace!(?topic, "no subscribers; event dropped");
            return Ok(0);
        }
        sender
            .send(event)
            .map_err(|e| RoverError::Channel(format!("{topic:?} send error: {e}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::DriveCommands => &self.drive_commands,
            Topic::Operator => &self.operator,
            Topic::Status => &self.status,
            Topic::Heartbeat => &self.heartbeat,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::{DriveCommand, EventPayload};

    fn drive_event(left: f32) -> Event {
        Event::new(
            "rover::test",
            EventPayload::Drive(DriveCommand { left, right: 0.0 }),
        )
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event()
    -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut sub1 = bus.subscribe_to(Topic::DriveCommands);
        let mut sub2 = bus.subscribe_to(Topic::DriveCommands);

        let event = drive_event(10.0);
        assert_eq!(bus.publish_to(Topic::DriveCommands, event.clone())?, 2);

        assert_eq!(sub1.recv().await?.id, event.id);
        assert_eq!(sub2.recv().await?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        let delivered = bus
            .publish_to(Topic::Status, drive_event(0.0))
            .expect("absent subscriber must not fail");
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events()
    -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut status = bus.subscribe_to(Topic::Status);
        let _drive = bus.subscribe_to(Topic::DriveCommands);

        bus.publish_to(Topic::DriveCommands, drive_event(1.0))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), status.recv()).await;
        assert!(result.is_err(), "status subscriber must not see drive events");
        assert_eq!(status.topic(), Topic::Status);
        Ok(())
    }

    #[test]
    fn try_recv_drains_without_blocking() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Operator);
        assert!(rx.try_recv().is_err());

        bus.publish_to(Topic::Operator, Event::new("station", EventPayload::ModeCode(2)))
            .unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.payload, EventPayload::ModeCode(2));
        assert!(rx.try_recv().is_err());
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Topic::DriveCommands);

        for i in 0..1_000 {
            let _ = bus.publish_to(Topic::DriveCommands, drive_event(i as f32));
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
