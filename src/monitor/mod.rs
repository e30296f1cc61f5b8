//! Worker output monitoring.
//!
//! ## Contents
//! - [`OutputMonitor`] two reader tasks per worker, sentinel detection, event publishing
//! - [`WorkerLog`] exclusively owned, timestamped append-only log
//! - [`Milestone`] what a sentinel line announces

mod log;
mod output;
mod sentinel;

pub use log::WorkerLog;
pub use output::OutputMonitor;
pub use sentinel::Milestone;
