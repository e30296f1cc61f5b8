//! Error types used by the fleet orchestrator and its collaborators.
//!
//! This module defines the error enums of the crate:
//!
//! - [`FleetError`] errors raised by the orchestration session itself.
//! - [`ControlPlaneError`] failures talking to the remote control plane.
//! - [`LaunchError`] failures spawning a worker process.
//! - [`LoadError`] failures loading a native module into a worker (see [`LoadErrorKind`]).
//! - [`TransitionError`] rejected lifecycle transitions.
//!
//! Every type provides `as_label` (stable snake_case label for logs/events) and,
//! where a caller may reasonably try again, `is_retryable`.

use std::path::PathBuf;

use thiserror::Error;

use crate::registry::LifecycleState;

/// # Errors produced by an orchestration session.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FleetError {
    /// Persisted settings are absent or incomplete; reconfigure and start again.
    #[error("configuration missing: {what}")]
    ConfigurationMissing {
        /// What exactly is missing (file path or setting name).
        what: String,
    },

    /// Required loadable modules are absent on disk.
    #[error("required modules missing: {missing:?}")]
    DependencyMissing {
        /// Every module path that could not be found.
        missing: Vec<PathBuf>,
    },

    /// The orchestration loop is already running.
    #[error("orchestrator already running")]
    AlreadyRunning,

    /// The orchestration loop is not running.
    #[error("orchestrator not running")]
    NotRunning,

    /// Control-plane call failed.
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    /// Worker launch failed.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Module load failed.
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl FleetError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use fleetvisor::FleetError;
    ///
    /// let err = FleetError::ConfigurationMissing { what: "settings".into() };
    /// assert_eq!(err.as_label(), "configuration_missing");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FleetError::ConfigurationMissing { .. } => "configuration_missing",
            FleetError::DependencyMissing { .. } => "dependency_missing",
            FleetError::AlreadyRunning => "already_running",
            FleetError::NotRunning => "not_running",
            FleetError::ControlPlane(e) => e.as_label(),
            FleetError::Launch(e) => e.as_label(),
            FleetError::Load(e) => e.as_label(),
        }
    }
}

/// # Errors produced by the control-plane client.
///
/// The orchestrator treats every one of these as non-fatal: a failed poll or
/// provisioning attempt simply skips this tick's scale-up.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    /// Transport-level failure (connect, timeout, TLS, ...).
    #[error("network failure calling {endpoint}: {error}")]
    Network {
        /// Endpoint path that was called.
        endpoint: &'static str,
        /// Underlying error message.
        error: String,
    },

    /// Server answered with a non-2xx status.
    #[error("{endpoint} answered {status}: {body}")]
    Status {
        /// Endpoint path that was called.
        endpoint: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body (possibly empty).
        body: String,
    },

    /// Response body could not be decoded.
    #[error("malformed response from {endpoint}: {error}")]
    Decode {
        /// Endpoint path that was called.
        endpoint: &'static str,
        /// Decoder message.
        error: String,
    },
}

impl ControlPlaneError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlPlaneError::Network { .. } => "network_failure",
            ControlPlaneError::Status { .. } => "control_plane_status",
            ControlPlaneError::Decode { .. } => "control_plane_decode",
        }
    }

    /// Network failures and error statuses are retried on the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ControlPlaneError::Network { .. } | ControlPlaneError::Status { .. }
        )
    }
}

/// # Errors produced while launching a worker process.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The configured worker executable does not exist.
    #[error("worker executable not found: {path:?}")]
    ExecutableNotFound {
        /// Resolved executable path.
        path: PathBuf,
    },

    /// The configured port is still bound by another process.
    #[error("port {port} is already in use")]
    PortInUse {
        /// Port that was checked.
        port: u16,
    },

    /// The OS refused to spawn the process.
    #[error("failed to spawn worker: {error}")]
    Spawn {
        /// Underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// A redirected output stream was not available after spawning.
    #[error("worker {stream} stream unavailable")]
    MissingStream {
        /// Stream name (`stdout` / `stderr`).
        stream: &'static str,
    },

    /// Any other launcher-specific failure.
    #[error("launch failed: {reason}")]
    Other {
        /// Human-readable reason.
        reason: String,
    },
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::ExecutableNotFound { .. } => "executable_not_found",
            LaunchError::PortInUse { .. } => "port_in_use",
            LaunchError::Spawn { .. } => "spawn_failed",
            LaunchError::MissingStream { .. } => "missing_stream",
            LaunchError::Other { .. } => "launch_failed",
        }
    }
}

/// Distinguishable failure kinds of a module load, in the order the load proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    /// Could not open the target process with the rights needed.
    ProcessAccessDenied,
    /// The module-load entry point could not be resolved.
    EntryPointNotFound,
    /// Allocating the path buffer inside the target failed.
    RemoteAllocationFailed,
    /// Writing the path into the target failed.
    RemoteWriteFailed,
    /// Starting the loader thread inside the target failed.
    RemoteThreadCreationFailed,
    /// Module loading is not available on this platform.
    Unsupported,
}

impl LoadErrorKind {
    /// Returns a short stable label (snake_case).
    pub fn as_label(&self) -> &'static str {
        match self {
            LoadErrorKind::ProcessAccessDenied => "process_access_denied",
            LoadErrorKind::EntryPointNotFound => "entry_point_not_found",
            LoadErrorKind::RemoteAllocationFailed => "remote_allocation_failed",
            LoadErrorKind::RemoteWriteFailed => "remote_write_failed",
            LoadErrorKind::RemoteThreadCreationFailed => "remote_thread_creation_failed",
            LoadErrorKind::Unsupported => "load_unsupported",
        }
    }
}

/// # Module load failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("loading {module:?} into pid {pid} failed: {kind:?} (os error {os_code:?})")]
pub struct LoadError {
    /// What went wrong.
    pub kind: LoadErrorKind,
    /// Target process id.
    pub pid: u32,
    /// Module that was being loaded.
    pub module: PathBuf,
    /// Raw OS error code, when the OS reported one.
    pub os_code: Option<u32>,
}

impl LoadError {
    /// Creates a load error without an OS code.
    pub fn new(kind: LoadErrorKind, pid: u32, module: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            pid,
            module: module.into(),
            os_code: None,
        }
    }

    /// Attaches the raw OS error code.
    #[inline]
    pub fn with_os_code(mut self, code: u32) -> Self {
        self.os_code = Some(code);
        self
    }

    /// Returns the label of the failure kind.
    pub fn as_label(&self) -> &'static str {
        self.kind.as_label()
    }

    /// Indicates whether nothing was written into the target yet, so trying again is safe.
    ///
    /// # Example
    /// ```
    /// use fleetvisor::{LoadError, LoadErrorKind};
    ///
    /// assert!(LoadError::new(LoadErrorKind::ProcessAccessDenied, 1, "a.dll").is_retryable());
    /// assert!(!LoadError::new(LoadErrorKind::RemoteWriteFailed, 1, "a.dll").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            LoadErrorKind::ProcessAccessDenied | LoadErrorKind::RemoteAllocationFailed
        )
    }
}

/// # Rejected lifecycle transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct TransitionError {
    /// State the instance was in.
    pub from: LifecycleState,
    /// Requested state.
    pub to: LifecycleState,
}
