//! # Event bus for lifecycle events.
//!
//! ```text
//! ProcessSupervisor ──┐
//! HealthMonitor     ──┼──► Bus ──► SubscriberSet listener ──► subscribers
//! server (shutdown) ──┘  (broadcast)
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - Capacity is shared by all receivers; a lagging receiver skips the oldest events.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for [`Event`]s. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receivers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_without_receivers_is_silent() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ShutdownRequested));
        assert_eq!(bus.receivers(), 0);

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::AppStarted).with_app("api"));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.app.as_deref(), Some("api"));
    }
}
