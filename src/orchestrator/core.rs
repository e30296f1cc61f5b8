use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::builder::OrchestratorBuilder;
use super::second_stage::SecondStageLoad;
use super::shutdown;
use crate::config::{FleetConfig, LaunchSpec, ModuleSet, Settings};
use crate::control_plane::{ControlPlane, Credential, HttpControlPlane};
use crate::error::{FleetError, LaunchError};
use crate::events::{Bus, Event, EventKind, WorkerEventReceiver, WorkerEventSender};
use crate::launcher::{Launch, LaunchRequest, LaunchedWorker, ProcessLauncher};
use crate::loader::{CodeLoader, NativeLoader};
use crate::registry::{InstanceStatus, Registry, RetiredWorker, WorkerId, WorkerInstance};
use crate::subscribers::{LogWriter, Subscribe};

/// Demand-driven supervisor of a fleet of worker processes.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Orchestrator {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub cfg: FleetConfig,
    pub bus: Bus,
    pub control_plane: Arc<dyn ControlPlane>,
    pub launcher: Arc<dyn Launch>,
    pub loader: Arc<dyn CodeLoader>,
    pub first_stage: Option<PathBuf>,
    pub second_stage: Arc<[PathBuf]>,
    pub registry: Mutex<Registry>,
    pub events_tx: WorkerEventSender,
    /// Held for the whole of a tick, which also serializes ticks.
    pub events_rx: Mutex<WorkerEventReceiver>,
    pub next_id: AtomicU64,
    /// Cancels in-flight second-stage loads; replaced after every `stop_all`.
    pub loads: std::sync::Mutex<CancellationToken>,
    pub run: Mutex<Option<RunHandle>>,
    /// Bus → subscriber forwarding task, if any subscriber is registered.
    pub listener: Option<JoinHandle<()>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = &self.listener {
            listener.abort();
        }
    }
}

pub(super) struct RunHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Outcome of [`Orchestrator::stop_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Whether the background loop was running.
    pub was_running: bool,
    pub terminated: Vec<WorkerId>,
    /// Workers whose termination failed, with the error message.
    pub terminate_failures: Vec<(WorkerId, String)>,
    pub revoked: usize,
    pub revoke_failures: usize,
}

impl Orchestrator {
    /// Starts configuring an orchestrator.
    pub fn builder(cfg: FleetConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(cfg)
    }

    /// Wires the production stack from persisted settings.
    ///
    /// Fails with `DependencyMissing` if any module is absent and with
    /// `ControlPlane` if the HTTP client cannot be built. Must be called
    /// inside a Tokio runtime.
    pub fn from_settings(
        settings: &Settings,
        modules: ModuleSet,
        log_dir: impl Into<PathBuf>,
        mut cfg: FleetConfig,
    ) -> Result<Self, FleetError> {
        modules.verify()?;
        cfg.apply_settings(settings);

        let control_plane =
            HttpControlPlane::new(&settings.base_url, &settings.secret, cfg.request_timeout)?;
        let loader: Arc<dyn CodeLoader> = Arc::new(NativeLoader::new());
        let launcher = ProcessLauncher::new(
            LaunchSpec::from_settings(settings, log_dir),
            Arc::clone(&loader),
            modules.first_stage.clone(),
        );
        let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

        Self::builder(cfg)
            .with_control_plane(Arc::new(control_plane))
            .with_launcher(Arc::new(launcher))
            .with_loader(loader)
            .with_modules(modules)
            .with_subscribers(subscribers)
            .build()
    }

    pub fn config(&self) -> &FleetConfig {
        &self.inner.cfg
    }

    /// Bus carrying every fleet event.
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Producer half of the worker event queue.
    ///
    /// Monitors created by the launcher already hold a clone; exposed for
    /// custom [`Launch`] implementations.
    pub fn worker_events(&self) -> WorkerEventSender {
        self.inner.events_tx.clone()
    }

    /// Starts the background loop with the given capacity.
    pub async fn start(&self, max_instances: usize) -> Result<(), FleetError> {
        let mut run = self.inner.run.lock().await;
        if run.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(FleetError::AlreadyRunning);
        }

        self.inner.registry.lock().await.set_capacity(max_instances);
        let token = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_loop(token.clone()));
        *run = Some(RunHandle { token, handle });

        info!(max_instances, "orchestrator started");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .run
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Stops the loop, terminates every worker and revokes every remaining credential.
    ///
    /// Best effort: a failure for one worker never stops cleanup of the others.
    /// Safe to call when not running.
    pub async fn stop_all(&self) -> ShutdownReport {
        self.inner
            .bus
            .publish(Event::new(EventKind::ShutdownRequested));

        let mut report = ShutdownReport::default();
        if let Some(run) = self.inner.run.lock().await.take() {
            report.was_running = !run.handle.is_finished();
            run.token.cancel();
            if let Err(e) = run.handle.await {
                warn!(error = %e, "orchestrator loop ended abnormally");
            }
        }

        {
            let mut loads = self
                .inner
                .loads
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            loads.cancel();
            *loads = CancellationToken::new();
        }

        let retired = self.inner.registry.lock().await.drain();
        for worker in retired {
            self.shutdown_worker(worker, &mut report).await;
        }

        info!(
            terminated = report.terminated.len(),
            failures = report.terminate_failures.len(),
            revoked = report.revoked,
            "orchestrator stopped"
        );
        report
    }

    async fn shutdown_worker(&self, worker: RetiredWorker, report: &mut ShutdownReport) {
        let RetiredWorker {
            id,
            pid,
            credential,
            mut process,
            monitor,
            ..
        } = worker;

        match process.terminate().await {
            Ok(()) => {
                self.inner.bus.publish(
                    Event::new(EventKind::WorkerTerminated)
                        .with_worker(id)
                        .with_pid(pid),
                );
                report.terminated.push(id);
            }
            Err(e) => {
                self.inner.bus.publish(
                    Event::new(EventKind::TerminateFailed)
                        .with_worker(id)
                        .with_pid(pid)
                        .with_reason(e.to_string()),
                );
                report.terminate_failures.push((id, e.to_string()));
            }
        }
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        if self.revoke(id, credential).await {
            report.revoked += 1;
        } else {
            report.revoke_failures += 1;
        }
    }

    /// Point-in-time view of every tracked worker, ordered by id.
    pub async fn status(&self) -> Vec<InstanceStatus> {
        self.inner
            .registry
            .lock()
            .await
            .snapshot(Instant::now(), self.inner.cfg.dwell)
    }

    /// Starts, waits for SIGINT/SIGTERM/Ctrl-C, then stops everything.
    pub async fn run_until_shutdown(
        &self,
        max_instances: usize,
    ) -> Result<ShutdownReport, FleetError> {
        self.start(max_instances).await?;
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => info!(signal, "shutdown signal received"),
            Err(e) => warn!(error = %e, "signal registration failed; stopping"),
        }
        Ok(self.stop_all().await)
    }

    /// Ticks every `tick_interval` until cancelled, handling worker events as they arrive in between.
    ///
    /// Cancellation is observed between ticks only.
    async fn run_loop(self, token: CancellationToken) {
        loop {
            self.tick().await;

            let deadline = Instant::now() + self.inner.cfg.tick_interval;
            loop {
                let received = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep_until(deadline) => break,
                    ev = self.recv_event() => ev,
                };
                // Applied outside the select: a received event must survive the deadline.
                if let Some(ev) = received {
                    self.apply_worker_event(ev).await;
                }
            }
        }
    }

    pub(super) fn next_worker_id(&self) -> WorkerId {
        WorkerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(super) async fn launch(
        &self,
        id: WorkerId,
        credential: &Credential,
    ) -> Result<LaunchedWorker, LaunchError> {
        self.inner
            .launcher
            .launch(LaunchRequest {
                id,
                credential,
                events: self.inner.events_tx.clone(),
            })
            .await
    }

    /// Inserts a launched worker, publishing its first-stage outcome.
    ///
    /// A refused worker is handed back for [`Self::discard`], which must run
    /// after the registry guard is released.
    pub(super) fn register(
        &self,
        id: WorkerId,
        credential: Credential,
        launched: LaunchedWorker,
        relaunches: u32,
        registry: &mut Registry,
    ) -> Result<(), RetiredWorker> {
        if let Some(module) = &self.inner.first_stage {
            let ev = match &launched.load_error {
                None => Event::new(EventKind::ModuleLoaded),
                Some(e) => Event::new(EventKind::ModuleLoadFailed).with_reason(e.to_string()),
            };
            self.inner.bus.publish(
                ev.with_worker(id)
                    .with_pid(launched.process.pid())
                    .with_module(module),
            );
        }

        let instance = WorkerInstance::new(id, credential, launched, relaunches, Instant::now());
        registry.insert(instance).map_err(|rejected| {
            warn!(worker = %id, "registry refused worker");
            rejected.retire()
        })
    }

    /// Terminates a worker the registry refused and revokes its credential.
    pub(super) async fn discard(&self, worker: RetiredWorker) {
        let mut report = ShutdownReport::default();
        self.shutdown_worker(worker, &mut report).await;
    }

    /// Revokes a credential, publishing the outcome. Returns whether it succeeded.
    pub(super) async fn revoke(&self, id: WorkerId, credential: Credential) -> bool {
        match self.inner.control_plane.revoke_credential(credential).await {
            Ok(()) => {
                self.inner
                    .bus
                    .publish(Event::new(EventKind::CredentialRevoked).with_worker(id));
                true
            }
            Err(e) => {
                self.inner.bus.publish(
                    Event::new(EventKind::RevokeFailed)
                        .with_worker(id)
                        .with_reason(e.to_string()),
                );
                false
            }
        }
    }

    /// Claims and spawns the second-stage load for `id`. No-op if already claimed.
    pub(super) fn start_second_stage(&self, registry: &mut Registry, id: WorkerId) -> bool {
        let Some(pid) = registry.begin_second_stage(id) else {
            return false;
        };
        let cancel = self
            .inner
            .loads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .child_token();

        let load = SecondStageLoad {
            id,
            pid,
            modules: Arc::clone(&self.inner.second_stage),
            delay: self.inner.cfg.second_stage_delay,
            loader: Arc::clone(&self.inner.loader),
            bus: self.inner.bus.clone(),
            events: self.inner.events_tx.clone(),
            cancel,
        };
        tokio::spawn(load.run());
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::{Mutex as StdMutex, Weak};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ControlPlaneError;
    use crate::events::WorkerEvent;
    use crate::launcher::{ProcessStatus, WorkerProcess};
    use crate::loader::UnsupportedLoader;
    use crate::policies::SecondStageTrigger;
    use crate::registry::LifecycleState;

    /// Never asks for workers; notes whether the registry was free while revoking.
    #[derive(Default)]
    struct QuietPlane {
        inner: StdMutex<Weak<Inner>>,
        revoked: StdMutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl ControlPlane for QuietPlane {
        async fn poll_demand(&self) -> Result<bool, ControlPlaneError> {
            Ok(false)
        }

        async fn provision_credential(&self) -> Result<Credential, ControlPlaneError> {
            Err(ControlPlaneError::Status {
                endpoint: "create",
                status: 503,
                body: String::new(),
            })
        }

        async fn revoke_credential(&self, credential: Credential) -> Result<(), ControlPlaneError> {
            let registry_free = self
                .inner
                .lock()
                .unwrap()
                .upgrade()
                .is_some_and(|inner| inner.registry.try_lock().is_ok());
            self.revoked
                .lock()
                .unwrap()
                .push((credential.delete_token, registry_free));
            Ok(())
        }
    }

    struct Stub {
        pid: u32,
        alive: Arc<AtomicBool>,
    }

    #[async_trait]
    impl WorkerProcess for Stub {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn status(&mut self) -> ProcessStatus {
            if self.alive.load(Ordering::SeqCst) {
                ProcessStatus::Alive
            } else {
                ProcessStatus::Exited(Some(1))
            }
        }

        async fn terminate(&mut self) -> std::io::Result<()> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn launched(id: WorkerId, alive: Arc<AtomicBool>) -> LaunchedWorker {
        LaunchedWorker {
            process: Box::new(Stub {
                pid: 100 + id.0 as u32,
                alive,
            }),
            monitor: None,
            code_loaded: true,
            load_error: None,
            log_path: None,
        }
    }

    struct StubLauncher;

    #[async_trait]
    impl Launch for StubLauncher {
        async fn launch(&self, request: LaunchRequest<'_>) -> Result<LaunchedWorker, LaunchError> {
            Ok(launched(request.id, Arc::new(AtomicBool::new(true))))
        }
    }

    fn orchestrator() -> (Orchestrator, Arc<QuietPlane>) {
        let plane = Arc::new(QuietPlane::default());
        let cfg = FleetConfig {
            second_stage_trigger: SecondStageTrigger::OnAuthentication,
            ..FleetConfig::default()
        };
        let orch = Orchestrator::builder(cfg)
            .with_control_plane(plane.clone())
            .with_launcher(Arc::new(StubLauncher))
            .with_loader(Arc::new(UnsupportedLoader::new()))
            .build()
            .unwrap();
        *plane.inner.lock().unwrap() = Arc::downgrade(&orch.inner);
        orch.inner.next_id.store(10, Ordering::Relaxed);
        (orch, plane)
    }

    async fn track(orch: &Orchestrator, id: WorkerId, alive: Arc<AtomicBool>) {
        let credential = Credential::new("u", "u@example.com", "pw", format!("tok-{}", id.0));
        let instance = WorkerInstance::new(id, credential, launched(id, alive), 0, Instant::now());
        assert!(orch.inner.registry.lock().await.insert(instance).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn event_received_while_registry_is_busy_survives_the_deadline() {
        let (orch, _plane) = orchestrator();
        track(&orch, WorkerId(1), Arc::new(AtomicBool::new(true))).await;
        orch.start(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let busy = orch.inner.registry.lock().await;
        orch.worker_events()
            .send(WorkerEvent::Listening(WorkerId(1)))
            .unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(orch.config().tick_interval + Duration::from_secs(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        drop(busy);
        tokio::time::sleep(Duration::from_millis(1)).await;

        let status = orch.status().await;
        assert_eq!(status[0].state, LifecycleState::SteadyStateWait);
        orch.stop_all().await;
    }

    #[tokio::test]
    async fn refused_relaunch_is_revoked_after_registry_is_released() {
        let (orch, plane) = orchestrator();
        orch.inner.registry.lock().await.set_capacity(2);
        let crashed = Arc::new(AtomicBool::new(true));
        track(&orch, WorkerId(1), crashed.clone()).await;
        track(&orch, WorkerId(2), Arc::new(AtomicBool::new(true))).await;
        orch.inner.registry.lock().await.set_capacity(1);
        crashed.store(false, Ordering::SeqCst);

        let report = orch.tick().await;
        assert_eq!(report.crashed_before_ready, vec![WorkerId(1)]);
        assert!(report.relaunched.is_empty());
        assert_eq!(report.reclaimed, vec![WorkerId(1)]);
        assert_eq!(
            *plane.revoked.lock().unwrap(),
            vec![("tok-1".to_string(), true)]
        );

        let ids: Vec<WorkerId> = orch.status().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![WorkerId(2)]);
    }
}
