//! # fleetvisor
//!
//! **Fleetvisor** runs a small fleet of ephemeral worker processes whose size is
//! driven by demand signals from a remote control plane.
//!
//! It provisions a credential per worker, launches the worker process, loads native
//! modules into it at two points of its lifecycle, watches its output for readiness
//! milestones, and decides whether a worker that exits is relaunched or reclaimed.
//!
//! ## Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Orchestrator (single cooperative loop, one tick per interval)    │
//! │  - Registry (workers by WorkerId, capacity = max_instances)       │
//! │  - Bus (broadcast events) ─► SubscriberSet ─► LogWriter, ...      │
//! │  - WorkerEvent queue (sentinels, second-stage results)            │
//! └──────┬─────────────────────┬─────────────────────┬────────────────┘
//!        ▼                     ▼                     ▼
//!  ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//!  │ ControlPlane │     │    Launch    │     │  CodeLoader  │
//!  │ poll/issue/  │     │ spawn, log,  │     │ load module  │
//!  │ revoke       │     │ first stage  │     │ into a pid   │
//!  └──────────────┘     └──────┬───────┘     └──────────────┘
//!                              ▼
//!                       ┌──────────────┐
//!                       │OutputMonitor │  stdout/stderr readers,
//!                       │              │  sentinels ─► WorkerEvent
//!                       └──────────────┘
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! Spawned ─► CodeLoaded ─► Authenticated ─► Listening ─► SteadyStateWait ─(dwell)─► Ready
//!   (launch)  (1st stage)   (auth sentinel   (listening
//!                            → 2nd stage)     sentinel)
//!
//! exit before Listening  ─► CrashBeforeReady ─► relaunch: same credential, new WorkerId
//! exit after Listening   ─► CrashAfterReady  ─► revoke credential, no relaunch
//! ```
//!
//! ### Scale-up gating
//! A tick only polls demand when the registry is below capacity, no worker is
//! inside its dwell window, and no worker is still in setup.
//!
//! ## Example
//! ```no_run
//! use fleetvisor::{FleetConfig, ModuleSet, Orchestrator, Settings, init_tracing};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_tracing();
//!
//!     let settings = Settings::load("settings.txt")?;
//!     let orchestrator = Orchestrator::from_settings(
//!         &settings,
//!         ModuleSet::in_dir("dll"),
//!         "logs",
//!         FleetConfig::default(),
//!     )?;
//!
//!     let report = orchestrator.run_until_shutdown(2).await?;
//!     println!("terminated {} workers", report.terminated.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control_plane;
pub mod error;
pub mod events;
pub mod launcher;
pub mod loader;
pub mod monitor;
pub mod orchestrator;
pub mod policies;
pub mod registry;
pub mod subscribers;
mod telemetry;

// ---- Public re-exports ----

pub use config::{FleetConfig, LaunchSpec, ModuleSet, Sentinels, Settings};
pub use control_plane::{ControlPlane, Credential, Endpoints, HttpControlPlane};
pub use error::{
    ControlPlaneError, FleetError, LaunchError, LoadError, LoadErrorKind, TransitionError,
};
pub use events::{Bus, Event, EventKind, WorkerEvent, WorkerEventSender};
pub use launcher::{
    ChildProcess, Launch, LaunchRequest, LaunchedWorker, ProcessLauncher, ProcessStatus,
    WorkerProcess,
};
pub use loader::{CodeLoader, NativeLoader, UnsupportedLoader};
pub use monitor::{OutputMonitor, WorkerLog};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, ShutdownReport, SkipReason, TickReport,
};
pub use policies::{CrashDecision, CrashPolicy, ExitClass, SecondStageTrigger};
pub use registry::{InstanceStatus, LifecycleState, StageProgress, WorkerId};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use telemetry::init_tracing;

#[cfg(windows)]
pub use loader::RemoteThreadLoader;
