//! # Fan-out of fleet events to subscribers.
//!
//! ```text
//!  Bus ──► listener ──► dispatch(ev)
//!                         ├──► lane "log"  (bounded) ──► LogWriter::on_event
//!                         └──► lane "..."  (bounded) ──► Subscribe::on_event
//!                                                          └─ panic ──► Bus: SubscriberPanicked
//! ```
//!
//! ## Rules
//! - Dispatch never waits. A full lane drops the event for that subscriber only and
//!   publishes `SubscriberOverflow`, except for overflow events themselves.
//! - Each lane is FIFO; lanes are independent of one another.
//! - A subscriber that panics keeps its lane and gets the next event.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Lane {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
}

/// Delivers fleet events to every registered [`Subscribe`] implementation.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    drains: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Opens one lane and one drain task per subscriber.
    #[must_use]
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (lanes, drains) = subscribers
            .into_iter()
            .map(|sub| open_lane(sub, &bus))
            .unzip();
        Self { lanes, drains, bus }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Spawns the task that forwards every bus event to this set.
    ///
    /// The task never ends on its own while the set holds the bus; abort the
    /// returned handle to detach it.
    pub fn listen(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => self.dispatch(Arc::new(ev)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "subscriber listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Queues `ev` on every lane without waiting.
    pub fn dispatch(&self, ev: Arc<Event>) {
        for lane in &self.lanes {
            let why = match lane.queue.try_send(Arc::clone(&ev)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            if !ev.is_subscriber_overflow() {
                self.bus.publish(Event::subscriber_overflow(lane.name, why));
            }
        }
    }

    /// Closes every lane and waits until each subscriber has handled what was queued.
    pub async fn close(self) {
        drop(self.lanes);
        for drain in self.drains {
            let _ = drain.await;
        }
    }
}

fn open_lane(sub: Arc<dyn Subscribe>, bus: &Bus) -> (Lane, JoinHandle<()>) {
    let name = sub.name();
    let (queue, mut inbox) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
    let bus = bus.clone();

    let drain = tokio::spawn(async move {
        while let Some(ev) = inbox.recv().await {
            let delivery = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind();
            if let Err(payload) = delivery.await {
                bus.publish(Event::subscriber_panicked(name, panic_message(payload.as_ref())));
            }
        }
    });
    (Lane { name, queue }, drain)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::events::EventKind;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, event: &Event) {
            self.0.lock().unwrap().push(event.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    struct Explode;

    #[async_trait]
    impl Subscribe for Explode {
        async fn on_event(&self, _event: &Event) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "explode"
        }
    }

    struct Stall;

    #[async_trait]
    impl Subscribe for Stall {
        async fn on_event(&self, _event: &Event) {
            std::future::pending::<()>().await;
        }
        fn name(&self) -> &'static str {
            "stall"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_reports_panics() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let collect = Arc::new(Collect::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![collect.clone() as Arc<dyn Subscribe>, Arc::new(Explode)];
        let set = SubscriberSet::new(subs, bus.clone());
        assert_eq!(set.len(), 2);

        set.dispatch(Arc::new(Event::new(EventKind::DemandPolled)));
        set.dispatch(Arc::new(Event::new(EventKind::WorkerLaunched)));
        set.close().await;

        assert_eq!(
            *collect.0.lock().unwrap(),
            vec![EventKind::DemandPolled, EventKind::WorkerLaunched]
        );

        let first = rx.recv().await.unwrap();
        assert!(first.is_subscriber_panic());
        assert!(first.reason.as_deref().unwrap().contains("explode"));
    }

    #[tokio::test]
    async fn full_lane_publishes_overflow() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Stall) as Arc<dyn Subscribe>], bus.clone());

        set.dispatch(Arc::new(Event::new(EventKind::DemandPolled)));
        set.dispatch(Arc::new(Event::new(EventKind::DemandPolled)));

        let ev = rx.recv().await.unwrap();
        assert!(ev.is_subscriber_overflow());
        assert!(ev.reason.as_deref().unwrap().contains("stall"));
        assert!(ev.reason.as_deref().unwrap().contains("full"));
    }

    #[tokio::test]
    async fn listener_forwards_bus_events() {
        let bus = Bus::new(16);
        let collect = Arc::new(Collect::default());
        let set = Arc::new(SubscriberSet::new(vec![collect.clone() as Arc<dyn Subscribe>], bus.clone()));
        let listener = set.listen();
        tokio::task::yield_now().await;

        bus.publish(Event::new(EventKind::ShutdownRequested));
        for _ in 0..50 {
            if !collect.0.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        listener.abort();

        assert_eq!(*collect.0.lock().unwrap(), vec![EventKind::ShutdownRequested]);
    }
}
