//! # Worker instance and its lifecycle state machine.
//!
//! ```text
//! Spawned ─► CodeLoaded ─► Authenticated ─► Listening ─► SteadyStateWait ─► Ready
//!    │            │              │              │               │             │
//!    └────────────┴──────────────┴──────┬───────┴───────────────┴─────────────┘
//!                                       ▼
//!                                      Gone
//! ```
//!
//! ## Rules
//! - States are ordered; an instance never moves backward.
//! - `Authenticated` is only reachable from `CodeLoaded`.
//! - `Listening` may be observed from any earlier live state (the worker says it serves).
//! - `Ready` is only reachable from `SteadyStateWait`.
//! - `Gone` is terminal and reachable from every non-terminal state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

use crate::control_plane::Credential;
use crate::error::TransitionError;
use crate::launcher::{LaunchedWorker, WorkerProcess};
use crate::monitor::OutputMonitor;

/// Orchestrator-assigned worker identity.
///
/// Ids are never reused within a session, so a relaunch always gets a fresh id
/// even if the OS hands out a recycled pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Lifecycle of one managed worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    /// Process exists; first-stage module not (successfully) loaded.
    Spawned,
    /// First-stage module loaded.
    CodeLoaded,
    /// Worker reported it is ready to authenticate.
    Authenticated,
    /// Worker reported it is listening.
    Listening,
    /// Dwell window after `Listening`; scale-up stays paused.
    SteadyStateWait,
    /// Fully settled; no longer exceptional for scaling decisions.
    Ready,
    /// Terminal.
    Gone,
}

impl LifecycleState {
    /// True for every state strictly before `Ready`.
    #[inline]
    pub fn in_setup(self) -> bool {
        self < LifecycleState::Ready
    }

    /// True once the listening milestone has been observed.
    #[inline]
    pub fn has_listened(self) -> bool {
        matches!(
            self,
            LifecycleState::Listening | LifecycleState::SteadyStateWait | LifecycleState::Ready
        )
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_advance_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, to) {
            (Gone, _) => false,
            (_, Gone) => true,
            (Spawned, CodeLoaded) => true,
            (CodeLoaded, Authenticated) => true,
            (from, Listening) => from < Listening,
            (Listening, SteadyStateWait) => true,
            (SteadyStateWait, Ready) => true,
            _ => false,
        }
    }
}

/// Progress of the second-stage module set for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageProgress {
    /// Not yet triggered.
    Pending,
    /// A load task has been started; no other trigger may start another.
    InFlight,
    /// All second-stage modules loaded.
    Loaded,
    /// A second-stage load failed; never retried in place.
    Failed,
}

/// One managed worker process.
pub struct WorkerInstance {
    id: WorkerId,
    pid: u32,
    credential: Credential,
    state: LifecycleState,
    code_loaded: bool,
    second_stage: StageProgress,
    ready_since: Option<Instant>,
    launched_at: Instant,
    relaunches: u32,
    terminating: bool,
    log_path: Option<PathBuf>,
    process: Box<dyn WorkerProcess>,
    monitor: Option<OutputMonitor>,
}

impl WorkerInstance {
    /// Builds the registry entry for a freshly launched worker.
    ///
    /// The instance starts in `Spawned` and moves to `CodeLoaded` only if the
    /// launcher's first-stage load succeeded.
    pub fn new(
        id: WorkerId,
        credential: Credential,
        launched: LaunchedWorker,
        relaunches: u32,
        now: Instant,
    ) -> Self {
        let LaunchedWorker {
            process,
            monitor,
            code_loaded,
            log_path,
            ..
        } = launched;

        Self {
            id,
            pid: process.pid(),
            credential,
            state: if code_loaded {
                LifecycleState::CodeLoaded
            } else {
                LifecycleState::Spawned
            },
            code_loaded,
            second_stage: StageProgress::Pending,
            ready_since: None,
            launched_at: now,
            relaunches,
            terminating: false,
            log_path,
            process,
            monitor,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn code_loaded(&self) -> bool {
        self.code_loaded
    }

    pub fn second_stage(&self) -> StageProgress {
        self.second_stage
    }

    pub fn ready_since(&self) -> Option<Instant> {
        self.ready_since
    }

    pub fn launched_at(&self) -> Instant {
        self.launched_at
    }

    /// How many times this worker's credential has already been relaunched.
    pub fn relaunches(&self) -> u32 {
        self.relaunches
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Moves the instance forward, refusing illegal or backward transitions.
    pub fn advance(&mut self, to: LifecycleState) -> Result<(), TransitionError> {
        if !self.state.can_advance_to(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Stamps the listening milestone and opens the dwell window.
    pub(crate) fn enter_wait_window(&mut self, now: Instant) -> Result<(), TransitionError> {
        self.advance(LifecycleState::Listening)?;
        self.advance(LifecycleState::SteadyStateWait)?;
        self.ready_since = Some(now);
        Ok(())
    }

    /// True while in `SteadyStateWait` and `dwell` has not elapsed.
    pub fn in_wait_window(&self, now: Instant, dwell: Duration) -> bool {
        self.state == LifecycleState::SteadyStateWait
            && self
                .ready_since
                .is_some_and(|since| now.saturating_duration_since(since) < dwell)
    }

    /// Remaining dwell, if the instance is inside its wait window.
    pub fn wait_remaining(&self, now: Instant, dwell: Duration) -> Option<Duration> {
        if self.state != LifecycleState::SteadyStateWait {
            return None;
        }
        self.ready_since
            .map(|since| dwell.saturating_sub(now.saturating_duration_since(since)))
    }

    pub(crate) fn set_second_stage(&mut self, progress: StageProgress) {
        self.second_stage = progress;
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.terminating
    }

    pub(crate) fn process_mut(&mut self) -> &mut dyn WorkerProcess {
        self.process.as_mut()
    }

    pub(crate) fn mark_terminating(&mut self) {
        self.terminating = true;
    }

    /// Splits the instance into what cleanup needs, marking it `Gone`.
    pub(crate) fn retire(mut self) -> RetiredWorker {
        self.state = LifecycleState::Gone;
        RetiredWorker {
            id: self.id,
            pid: self.pid,
            credential: self.credential,
            relaunches: self.relaunches,
            process: self.process,
            monitor: self.monitor,
        }
    }

    pub(crate) fn status(&self, now: Instant, dwell: Duration) -> InstanceStatus {
        InstanceStatus {
            id: self.id,
            pid: self.pid,
            state: self.state,
            code_loaded: self.code_loaded,
            second_stage: self.second_stage,
            wait_remaining: self.wait_remaining(now, dwell),
            uptime: now.saturating_duration_since(self.launched_at),
            relaunches: self.relaunches,
            log_path: self.log_path.clone(),
        }
    }
}

impl fmt::Debug for WorkerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerInstance")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("code_loaded", &self.code_loaded)
            .field("second_stage", &self.second_stage)
            .field("relaunches", &self.relaunches)
            .finish_non_exhaustive()
    }
}

/// A worker removed from the registry, owning what cleanup still needs.
pub(crate) struct RetiredWorker {
    pub id: WorkerId,
    pub pid: u32,
    pub credential: Credential,
    pub relaunches: u32,
    pub process: Box<dyn WorkerProcess>,
    pub monitor: Option<OutputMonitor>,
}

/// Point-in-time view of one worker, returned by `Orchestrator::status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStatus {
    pub id: WorkerId,
    pub pid: u32,
    pub state: LifecycleState,
    pub code_loaded: bool,
    pub second_stage: StageProgress,
    /// Time left in the dwell window (only in `SteadyStateWait`).
    pub wait_remaining: Option<Duration>,
    pub uptime: Duration,
    pub relaunches: u32,
    pub log_path: Option<PathBuf>,
}
