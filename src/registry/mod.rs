//! Worker registry and lifecycle types.
//!
//! ## Contents
//! - [`LifecycleState`], [`WorkerInstance`], [`WorkerId`] the per-worker state machine
//! - [`Registry`] the table of active workers (single source of truth)
//! - [`InstanceStatus`] the snapshot type returned by `Orchestrator::status`

mod instance;
mod table;

pub use instance::{InstanceStatus, LifecycleState, StageProgress, WorkerId, WorkerInstance};
pub use table::Registry;

pub(crate) use instance::RetiredWorker;
pub(crate) use table::ExitedWorker;
