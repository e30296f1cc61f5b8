//! # Registry: the single source of truth for active workers.
//!
//! Only the orchestrator owns a [`Registry`] and it only exposes
//! intention-revealing operations; there is no raw map access.
//!
//! ## Rules
//! - `len() <= capacity` at all times (`insert` refuses past capacity).
//! - Insertion happens only on scale-up / relaunch; removal only via
//!   [`Registry::take_exited`] or [`Registry::drain`].
//! - Monitor-driven mutations (`mark_authenticated`, `mark_listening`) go through
//!   the orchestrator loop, so every field update is serialized.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use super::instance::{InstanceStatus, RetiredWorker, StageProgress, WorkerId, WorkerInstance};
use super::LifecycleState;
use crate::error::TransitionError;
use crate::launcher::ProcessStatus;

/// Worker that was found dead by a sweep and removed.
pub(crate) struct ExitedWorker {
    pub worker: RetiredWorker,
    /// State observed right before removal.
    pub last_state: LifecycleState,
    pub exit_code: Option<i32>,
}

/// Outcome of one liveness pass.
#[derive(Default)]
pub(crate) struct Sweep {
    pub exited: Vec<ExitedWorker>,
    /// Workers whose status could not be determined; left in place.
    pub unknown: Vec<WorkerId>,
}

/// Table of active workers keyed by [`WorkerId`].
#[derive(Debug)]
pub struct Registry {
    instances: BTreeMap<WorkerId, WorkerInstance>,
    capacity: usize,
}

impl Registry {
    /// Creates an empty registry holding at most `capacity` workers.
    pub fn new(capacity: usize) -> Self {
        Self {
            instances: BTreeMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.instances.len() >= self.capacity
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerInstance> {
        self.instances.get(&id)
    }

    /// Adds a worker; hands it back if the registry is full or the id is taken.
    pub fn insert(&mut self, instance: WorkerInstance) -> Result<(), WorkerInstance> {
        if self.is_full() || self.instances.contains_key(&instance.id()) {
            return Err(instance);
        }
        self.instances.insert(instance.id(), instance);
        Ok(())
    }

    /// True if any worker is strictly before `Ready`.
    pub fn any_in_setup(&self) -> bool {
        self.instances.values().any(|w| w.state().in_setup())
    }

    /// True if any worker is inside an unexpired dwell window.
    pub fn any_in_wait_window(&self, now: Instant, dwell: Duration) -> bool {
        self.instances.values().any(|w| w.in_wait_window(now, dwell))
    }

    /// `CodeLoaded -> Authenticated`. `None` if the worker is no longer tracked.
    pub fn mark_authenticated(&mut self, id: WorkerId) -> Option<Result<(), TransitionError>> {
        self.instances
            .get_mut(&id)
            .map(|w| w.advance(LifecycleState::Authenticated))
    }

    /// `* -> Listening -> SteadyStateWait`, stamping `ready_since = now`.
    pub fn mark_listening(
        &mut self,
        id: WorkerId,
        now: Instant,
    ) -> Option<Result<(), TransitionError>> {
        self.instances
            .get_mut(&id)
            .map(|w| w.enter_wait_window(now))
    }

    /// Promotes every worker whose dwell has fully elapsed to `Ready`.
    pub fn promote_ready(&mut self, now: Instant, dwell: Duration) -> Vec<WorkerId> {
        let mut promoted = Vec::new();
        for w in self.instances.values_mut() {
            let elapsed = match (w.state(), w.ready_since()) {
                (LifecycleState::SteadyStateWait, Some(since)) => {
                    now.saturating_duration_since(since)
                }
                _ => continue,
            };
            if elapsed >= dwell && w.advance(LifecycleState::Ready).is_ok() {
                promoted.push(w.id());
            }
        }
        promoted
    }

    /// Claims the second-stage load for `id`, returning its pid.
    ///
    /// Succeeds at most once per worker: the progress flag moves to `InFlight`
    /// before the caller starts loading, so a second trigger gets `None`.
    pub fn begin_second_stage(&mut self, id: WorkerId) -> Option<u32> {
        let w = self.instances.get_mut(&id)?;
        if w.second_stage() != StageProgress::Pending || w.state() < LifecycleState::CodeLoaded {
            return None;
        }
        w.set_second_stage(StageProgress::InFlight);
        Some(w.pid())
    }

    /// Records the result of a second-stage load started by [`Self::begin_second_stage`].
    pub fn finish_second_stage(&mut self, id: WorkerId, loaded: bool) -> bool {
        match self.instances.get_mut(&id) {
            Some(w) if w.second_stage() == StageProgress::InFlight => {
                w.set_second_stage(if loaded {
                    StageProgress::Loaded
                } else {
                    StageProgress::Failed
                });
                true
            }
            _ => false,
        }
    }

    /// Workers eligible for a sweep-driven second-stage load.
    pub fn second_stage_candidates(&self) -> Vec<WorkerId> {
        self.instances
            .values()
            .filter(|w| {
                w.second_stage() == StageProgress::Pending
                    && w.state() >= LifecycleState::CodeLoaded
                    && !w.is_terminating()
            })
            .map(WorkerInstance::id)
            .collect()
    }

    /// Queries every process and removes the ones that have exited.
    ///
    /// `Unknown` is never collapsed into `Exited`: such workers stay tracked.
    pub(crate) fn take_exited(&mut self) -> Sweep {
        let mut sweep = Sweep::default();
        let mut dead = Vec::new();

        for w in self.instances.values_mut() {
            match w.process_mut().status() {
                ProcessStatus::Alive => {}
                ProcessStatus::Exited(code) => dead.push((w.id(), code)),
                ProcessStatus::Unknown => sweep.unknown.push(w.id()),
            }
        }

        for (id, exit_code) in dead {
            if let Some(w) = self.instances.remove(&id) {
                let last_state = w.state();
                sweep.exited.push(ExitedWorker {
                    worker: w.retire(),
                    last_state,
                    exit_code,
                });
            }
        }
        sweep
    }

    /// Live workers that have not listened within `timeout` of their launch.
    pub fn overdue(&self, now: Instant, timeout: Duration) -> Vec<WorkerId> {
        self.instances
            .values()
            .filter(|w| {
                !w.state().has_listened()
                    && !w.is_terminating()
                    && now.saturating_duration_since(w.launched_at()) >= timeout
            })
            .map(WorkerInstance::id)
            .collect()
    }

    /// Requests termination of one worker; it is reclaimed by a later sweep.
    pub(crate) async fn terminate(&mut self, id: WorkerId) -> Option<std::io::Result<()>> {
        let w = self.instances.get_mut(&id)?;
        w.mark_terminating();
        Some(w.process_mut().terminate().await)
    }

    /// Removes every worker (full shutdown).
    pub(crate) fn drain(&mut self) -> Vec<RetiredWorker> {
        std::mem::take(&mut self.instances)
            .into_values()
            .map(WorkerInstance::retire)
            .collect()
    }

    /// Snapshot of every tracked worker, ordered by id.
    pub fn snapshot(&self, now: Instant, dwell: Duration) -> Vec<InstanceStatus> {
        self.instances
            .values()
            .map(|w| w.status(now, dwell))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::control_plane::Credential;
    use crate::launcher::{LaunchedWorker, WorkerProcess};

    struct StubProcess {
        pid: u32,
        // 0 = alive, 1 = exited, 2 = unknown
        status: Arc<AtomicU8>,
    }

    #[async_trait]
    impl WorkerProcess for StubProcess {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn status(&mut self) -> ProcessStatus {
            match self.status.load(Ordering::SeqCst) {
                0 => ProcessStatus::Alive,
                1 => ProcessStatus::Exited(Some(0)),
                _ => ProcessStatus::Unknown,
            }
        }

        async fn terminate(&mut self) -> std::io::Result<()> {
            self.status.store(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn worker(id: u64, code_loaded: bool, now: Instant) -> (WorkerInstance, Arc<AtomicU8>) {
        let status = Arc::new(AtomicU8::new(0));
        let launched = LaunchedWorker {
            process: Box::new(StubProcess {
                pid: 1000 + id as u32,
                status: status.clone(),
            }),
            monitor: None,
            code_loaded,
            load_error: None,
            log_path: None,
        };
        let cred = Credential::new("user", "user@example.com", "pw", format!("tok-{id}"));
        (
            WorkerInstance::new(WorkerId(id), cred, launched, 0, now),
            status,
        )
    }

    #[tokio::test]
    async fn insert_respects_capacity() {
        let now = Instant::now();
        let mut reg = Registry::new(1);
        assert!(reg.insert(worker(1, true, now).0).is_ok());
        let rejected = reg.insert(worker(2, true, now).0).unwrap_err();
        assert_eq!(rejected.id(), WorkerId(2));
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn failed_first_stage_stays_spawned_and_cannot_authenticate() {
        let now = Instant::now();
        let mut reg = Registry::new(2);
        reg.insert(worker(1, false, now).0).unwrap();
        assert_eq!(reg.get(WorkerId(1)).unwrap().state(), LifecycleState::Spawned);
        assert!(reg.mark_authenticated(WorkerId(1)).unwrap().is_err());
        assert!(reg.begin_second_stage(WorkerId(1)).is_none());
    }

    #[tokio::test]
    async fn second_stage_is_claimed_once() {
        let now = Instant::now();
        let mut reg = Registry::new(2);
        reg.insert(worker(1, true, now).0).unwrap();
        assert_eq!(reg.begin_second_stage(WorkerId(1)), Some(1001));
        assert_eq!(reg.begin_second_stage(WorkerId(1)), None);
        assert!(reg.second_stage_candidates().is_empty());
        assert!(reg.finish_second_stage(WorkerId(1), true));
        assert!(!reg.finish_second_stage(WorkerId(1), true));
        assert_eq!(
            reg.get(WorkerId(1)).unwrap().second_stage(),
            StageProgress::Loaded
        );
    }

    #[tokio::test]
    async fn promotion_waits_for_full_dwell() {
        let start = Instant::now();
        let dwell = Duration::from_secs(70);
        let mut reg = Registry::new(2);
        reg.insert(worker(1, true, start).0).unwrap();
        reg.mark_listening(WorkerId(1), start).unwrap().unwrap();

        assert!(reg.any_in_wait_window(start + Duration::from_secs(69), dwell));
        assert!(reg
            .promote_ready(start + Duration::from_secs(69), dwell)
            .is_empty());

        assert_eq!(
            reg.promote_ready(start + dwell, dwell),
            vec![WorkerId(1)]
        );
        assert!(!reg.any_in_setup());
    }

    #[tokio::test]
    async fn sweep_separates_exited_from_unknown() {
        let now = Instant::now();
        let mut reg = Registry::new(3);
        let (a, a_status) = worker(1, true, now);
        let (b, b_status) = worker(2, true, now);
        let (c, _) = worker(3, true, now);
        reg.insert(a).unwrap();
        reg.insert(b).unwrap();
        reg.insert(c).unwrap();

        a_status.store(1, Ordering::SeqCst);
        b_status.store(2, Ordering::SeqCst);

        let sweep = reg.take_exited();
        assert_eq!(sweep.exited.len(), 1);
        assert_eq!(sweep.exited[0].worker.id, WorkerId(1));
        assert_eq!(sweep.exited[0].last_state, LifecycleState::CodeLoaded);
        assert_eq!(sweep.unknown, vec![WorkerId(2)]);
        assert_eq!(reg.len(), 2);
    }

    #[tokio::test]
    async fn overdue_ignores_listening_workers() {
        let start = Instant::now();
        let mut reg = Registry::new(2);
        reg.insert(worker(1, true, start).0).unwrap();
        reg.insert(worker(2, true, start).0).unwrap();
        reg.mark_listening(WorkerId(2), start).unwrap().unwrap();

        let later = start + Duration::from_secs(600);
        assert_eq!(
            reg.overdue(later, Duration::from_secs(300)),
            vec![WorkerId(1)]
        );
        reg.terminate(WorkerId(1)).await.unwrap().unwrap();
        assert!(reg.overdue(later, Duration::from_secs(300)).is_empty());
    }
}
