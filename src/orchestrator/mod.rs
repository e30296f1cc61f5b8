//! # Orchestrator: demand-driven scaling and crash supervision.
//!
//! The [`Orchestrator`] owns the registry, the event bus and the worker event
//! queue. A single cooperative loop ticks every `tick_interval`; between ticks it
//! applies worker events (sentinels, second-stage results) as they arrive.
//!
//! ```text
//!                 ┌──────────── Orchestrator loop ─────────────┐
//!  ControlPlane ◄─┤ poll ─► provision ─► Launch ─► Registry    │
//!                 │                        │          ▲        │
//!                 │                        ▼          │        │
//!                 │                OutputMonitor ── WorkerEvent│
//!                 │                                            │
//!                 │ sweep ─► ExitClass ─► CrashPolicy          │
//!                 │             ├─► Relaunch (same credential) │
//!                 │             └─► Reclaim  (revoke)          │
//!                 └───────────────┬────────────────────────────┘
//!                                 ▼
//!                        Bus ─► SubscriberSet ─► LogWriter, ...
//! ```
//!
//! ## Public surface
//! - [`Orchestrator::start`], [`Orchestrator::stop_all`], [`Orchestrator::status`]
//! - [`Orchestrator::tick`] for deterministic driving, returning a [`TickReport`]
//! - [`Orchestrator::run_until_shutdown`] for a signal-driven session

mod builder;
mod core;
mod second_stage;
mod shutdown;
mod tick;

pub use builder::OrchestratorBuilder;
pub use self::core::{Orchestrator, ShutdownReport};
pub use shutdown::wait_for_shutdown_signal;
pub use tick::{SkipReason, TickReport};
