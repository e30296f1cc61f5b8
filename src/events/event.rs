//! # Fleet events emitted by the orchestrator and its workers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Scaling events**: demand polls, credential provisioning, launches
//! - **Worker lifecycle events**: module loads, sentinels, readiness
//! - **Reclamation events**: crashes, relaunches, revocations, termination
//! - **Subscriber events**: overflow and panics inside the fan-out
//!
//! The [`Event`] struct carries the metadata each kind sets: worker id, OS pid,
//! a human-readable reason and, for loads, the module path.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use fleetvisor::{Event, EventKind, WorkerId};
//!
//! let ev = Event::new(EventKind::LaunchFailed)
//!     .with_worker(WorkerId(3))
//!     .with_reason("port 7777 is already in use");
//!
//! assert_eq!(ev.kind, EventKind::LaunchFailed);
//! assert_eq!(ev.worker, Some(WorkerId(3)));
//! assert_eq!(ev.reason.as_deref(), Some("port 7777 is already in use"));
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::registry::WorkerId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of fleet events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Scaling ===
    /// Scale-up was not attempted this tick.
    ///
    /// Sets:
    /// - `reason`: `at_capacity`, `in_wait_window` or `in_setup`
    ScaleUpSkipped,

    /// Demand poll answered.
    ///
    /// Sets:
    /// - `reason`: `"scale"` or `"idle"`
    DemandPolled,

    /// Demand poll failed; scale-up skipped for this tick.
    ///
    /// Sets:
    /// - `reason`: error message
    PollFailed,

    /// A fresh credential was provisioned for a worker about to launch.
    ///
    /// Sets:
    /// - `worker`: id reserved for the launch
    CredentialProvisioned,

    /// Provisioning failed; scale-up skipped for this tick.
    ///
    /// Sets:
    /// - `reason`: error message
    ProvisionFailed,

    /// A worker process was spawned and registered.
    ///
    /// Sets:
    /// - `worker`, `pid`
    WorkerLaunched,

    /// Spawning a worker failed; its credential is revoked.
    ///
    /// Sets:
    /// - `worker`: id reserved for the launch
    /// - `reason`: error message
    LaunchFailed,

    // === Worker lifecycle ===
    /// A module was loaded into a worker.
    ///
    /// Sets:
    /// - `worker`, `pid`, `module`
    ModuleLoaded,

    /// Loading a module into a worker failed.
    ///
    /// Sets:
    /// - `worker`, `pid`, `module`
    /// - `reason`: failure label and OS code
    ModuleLoadFailed,

    /// The worker printed the authentication sentinel.
    ///
    /// Sets:
    /// - `worker`
    AuthReady,

    /// The worker printed the listening sentinel; its wait window starts.
    ///
    /// Sets:
    /// - `worker`
    Listening,

    /// The worker stayed alive through the whole wait window.
    ///
    /// Sets:
    /// - `worker`, `pid`
    WorkerReady,

    // === Reclamation ===
    /// A worker exited before becoming ready.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `reason`: last lifecycle state and exit code
    CrashBeforeReady,

    /// A ready worker exited.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `reason`: exit code
    CrashAfterReady,

    /// A replacement worker was launched with the crashed worker's credential.
    ///
    /// Sets:
    /// - `worker`: id of the replacement
    /// - `pid`: pid of the replacement
    /// - `reason`: id of the crashed worker
    WorkerRelaunched,

    /// A credential was released on the control plane.
    ///
    /// Sets:
    /// - `worker`: the worker that held it
    CredentialRevoked,

    /// Revocation failed; the credential is abandoned.
    ///
    /// Sets:
    /// - `worker`
    /// - `reason`: error message
    RevokeFailed,

    // === Shutdown ===
    /// Shutdown requested (explicit stop or OS signal).
    ShutdownRequested,

    /// A worker was terminated by the orchestrator.
    ///
    /// Sets:
    /// - `worker`, `pid`
    WorkerTerminated,

    /// Terminating a worker failed.
    ///
    /// Sets:
    /// - `worker`, `pid`
    /// - `reason`: error message
    TerminateFailed,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: subscriber name and reason
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: panic info
    SubscriberPanicked,
}

/// Fleet event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker the event is about, if any.
    pub worker: Option<WorkerId>,
    /// OS process id of that worker.
    pub pid: Option<u32>,
    /// Human-readable reason (errors, skip reasons, overflow details).
    pub reason: Option<Arc<str>>,
    /// Module path for load events.
    pub module: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            pid: None,
            reason: None,
            module: None,
        }
    }

    #[inline]
    pub fn with_worker(mut self, id: WorkerId) -> Self {
        self.worker = Some(id);
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a module path (lossy UTF-8).
    #[inline]
    pub fn with_module(mut self, module: &Path) -> Self {
        self.module = Some(module.to_string_lossy().into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::DemandPolled);
        let b = Event::new(EventKind::DemandPolled);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn module_path_is_recorded() {
        let ev = Event::new(EventKind::ModuleLoaded)
            .with_worker(WorkerId(1))
            .with_pid(4242)
            .with_module(Path::new("bin/server.dll"));
        assert_eq!(ev.module.as_deref(), Some("bin/server.dll"));
        assert_eq!(ev.pid, Some(4242));
    }
}
