//! Fleet events: types, broadcast bus and the worker event queue.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//! - [`WorkerEvent`] point-to-point notifications from monitors and load tasks
//!
//! ## Quick reference
//! - **Bus publishers**: `Orchestrator` (every tick phase), `SubscriberSet` workers (overflow/panic).
//! - **Bus consumers**: the orchestrator's subscriber listener, which fans out to `SubscriberSet`.
//! - **Worker queue**: `OutputMonitor` readers and second-stage load tasks produce,
//!   the orchestrator's tick drains.

mod bus;
mod event;
mod worker;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use worker::{WorkerEvent, WorkerEventReceiver, WorkerEventSender, worker_channel};
