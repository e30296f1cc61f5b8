//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so the orchestrator can publish
//! without ever waiting on observers.
//!
//! ```text
//!   tick phases ──┐
//!   stop_all    ──┼──► Bus ──► subscriber listener ──► SubscriberSet ──► LogWriter, ...
//!   load tasks  ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - One ring buffer of `capacity` events is shared by all receivers.
//! - A lagging receiver sees `RecvError::Lagged(n)` and skips the `n` oldest events.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for fleet events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding at most `capacity` undelivered events (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_see_events_published_after_subscribing() {
        let bus = Bus::new(4);
        bus.publish(Event::new(EventKind::DemandPolled));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ShutdownRequested));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ShutdownRequested);
    }

    #[tokio::test]
    async fn lagging_receiver_skips_oldest() {
        let bus = Bus::new(1);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::DemandPolled));
        bus.publish(Event::new(EventKind::PollFailed));

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::PollFailed);
    }
}
