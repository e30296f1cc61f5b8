//! Worker launching.
//!
//! ## Contents
//! - [`Launch`] capability to start one worker for a credential
//! - [`ProcessLauncher`] spawns an OS process, wires its monitor and loads the first stage
//! - [`WorkerProcess`], [`ProcessStatus`] the handle the registry keeps per worker
//! - [`ChildProcess`] [`WorkerProcess`] over an owned `tokio::process::Child`
//!
//! ## Flow
//! ```text
//! LaunchRequest{id, credential, events}
//!   ├─► executable exists?            else ExecutableNotFound
//!   ├─► free_port unbound?            else PortInUse
//!   ├─► spawn (piped stdout/stderr)   else Spawn
//!   ├─► open <log_dir>/worker-<id>.log, start OutputMonitor
//!   └─► load first-stage module       failure recorded, launch still succeeds
//! ```

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::control_plane::Credential;
use crate::error::{LaunchError, LoadError};
use crate::events::WorkerEventSender;
use crate::monitor::OutputMonitor;
use crate::registry::WorkerId;

mod port;
mod process;
mod spawn;

pub use port::ensure_port_free;
pub use process::ChildProcess;
pub use spawn::ProcessLauncher;

/// Liveness of a worker process, read from its owned handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Alive,
    /// Exited with the given code (`None` when killed by a signal).
    Exited(Option<i32>),
    /// The status query itself failed; neither alive nor exited is known.
    Unknown,
}

/// Handle to one running worker.
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Non-blocking liveness query.
    fn status(&mut self) -> ProcessStatus;

    /// Force-terminates the process and reaps it. Terminating an exited process is a no-op.
    async fn terminate(&mut self) -> io::Result<()>;
}

/// What a launcher needs to start one worker.
pub struct LaunchRequest<'a> {
    pub id: WorkerId,
    pub credential: &'a Credential,
    /// Where the worker's monitor publishes sentinel events.
    pub events: WorkerEventSender,
}

/// A started worker, ready to be registered.
pub struct LaunchedWorker {
    pub process: Box<dyn WorkerProcess>,
    pub monitor: Option<OutputMonitor>,
    /// Whether the first-stage module load succeeded.
    pub code_loaded: bool,
    /// Why the first-stage load failed, when it did.
    pub load_error: Option<LoadError>,
    pub log_path: Option<PathBuf>,
}

/// Capability to start workers.
#[async_trait]
pub trait Launch: Send + Sync + 'static {
    async fn launch(&self, request: LaunchRequest<'_>) -> Result<LaunchedWorker, LaunchError>;
}
