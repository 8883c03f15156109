//! services/api/src/adapters/publisher.rs
//!
//! Fans lesson progress events out to every connected WebSocket client.
//! It implements the `ProgressPublisher` port from the `core` crate.

use async_trait::async_trait;
use lesson_core::domain::LessonEvent;
use lesson_core::ports::ProgressPublisher;
use tokio::sync::broadcast;
use tracing::debug;

/// Events published while nobody is listening are dropped; slow subscribers
/// skip ahead once they fall `capacity` events behind.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<LessonEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LessonEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ProgressPublisher for BroadcastPublisher {
    async fn publish(&self, event: LessonEvent) {
        let lesson_id = event.lesson_id;
        match self.tx.send(event) {
            Ok(receivers) => debug!(lesson_id, receivers, "Lesson event published"),
            Err(_) => debug!(lesson_id, "Lesson event dropped, no subscribers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let publisher = BroadcastPublisher::default();
        let mut rx = publisher.subscribe();

        publisher.publish(LessonEvent::progress(1, 10, "start")).await;
        publisher.publish(LessonEvent::error(1, "boom")).await;

        assert_eq!(rx.recv().await.unwrap().progress, Some(10));
        assert_eq!(rx.recv().await.unwrap().message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_harmless() {
        let publisher = BroadcastPublisher::default();
        publisher.publish(LessonEvent::progress(1, 10, "start")).await;
    }
}
