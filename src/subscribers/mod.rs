//! # Event subscribers.
//!
//! ```text
//! Orchestrator ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                            ├──► LogWriter
//!                                                            └──► custom Subscribe impls
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use fleetvisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct CrashCounter;
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::CrashBeforeReady {
//!             // increment a counter
//!         }
//!     }
//! }
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
