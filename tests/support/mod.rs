#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetvisor::{
    CodeLoader, ControlPlane, ControlPlaneError, Credential, FleetConfig, Launch, LaunchError,
    LaunchRequest, LaunchedWorker, LoadError, LoadErrorKind, ModuleSet, Orchestrator,
    ProcessStatus, WorkerId, WorkerProcess,
};

/// Control plane answering from a scripted demand queue (empty queue = no demand).
#[derive(Default)]
pub struct FakeControlPlane {
    demand: Mutex<VecDeque<Option<bool>>>,
    polls: AtomicUsize,
    provisioned: AtomicUsize,
    fail_provision: AtomicBool,
    revoked: Mutex<Vec<String>>,
}

impl FakeControlPlane {
    /// Queues demand answers; `None` is a network failure.
    pub fn script(&self, answers: impl IntoIterator<Item = Option<bool>>) {
        self.demand.lock().unwrap().extend(answers);
    }

    pub fn fail_provisioning(&self, fail: bool) {
        self.fail_provision.store(fail, Ordering::SeqCst);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn provisioned(&self) -> usize {
        self.provisioned.load(Ordering::SeqCst)
    }

    /// Delete tokens of revoked credentials, in order.
    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn poll_demand(&self) -> Result<bool, ControlPlaneError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.demand.lock().unwrap().pop_front() {
            Some(Some(demand)) => Ok(demand),
            Some(None) => Err(ControlPlaneError::Network {
                endpoint: "serverInfo",
                error: "connection refused".into(),
            }),
            None => Ok(false),
        }
    }

    async fn provision_credential(&self) -> Result<Credential, ControlPlaneError> {
        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(ControlPlaneError::Status {
                endpoint: "create",
                status: 500,
                body: "no accounts left".into(),
            });
        }
        let n = self.provisioned.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential::new(
            format!("srv{n}"),
            format!("srv{n}@example.com"),
            "pw",
            format!("tok-{n}"),
        ))
    }

    async fn revoke_credential(&self, credential: Credential) -> Result<(), ControlPlaneError> {
        self.revoked.lock().unwrap().push(credential.delete_token);
        Ok(())
    }
}

/// In-memory worker whose liveness is flipped by the test.
pub struct FakeProcess {
    pid: u32,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl WorkerProcess for FakeProcess {
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

/// Launcher that "spawns" [`FakeProcess`]es instantly.
pub struct FakeLauncher {
    fail_next: AtomicUsize,
    code_loaded: AtomicBool,
    launches: Mutex<Vec<(WorkerId, String)>>,
    alive: Mutex<HashMap<WorkerId, Arc<AtomicBool>>>,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self {
            fail_next: AtomicUsize::new(0),
            code_loaded: AtomicBool::new(true),
            launches: Mutex::new(Vec::new()),
            alive: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeLauncher {
    pub fn pid_of(id: WorkerId) -> u32 {
        1000 + id.0 as u32
    }

    /// The next `n` launches fail with `PortInUse`.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Whether the first-stage load of future launches succeeds.
    pub fn first_stage_succeeds(&self, ok: bool) {
        self.code_loaded.store(ok, Ordering::SeqCst);
    }

    /// Successful launches as `(id, delete token)`.
    pub fn launches(&self) -> Vec<(WorkerId, String)> {
        self.launches.lock().unwrap().clone()
    }

    pub fn token_of(&self, id: WorkerId) -> Option<String> {
        self.launches()
            .into_iter()
            .find(|(w, _)| *w == id)
            .map(|(_, t)| t)
    }

    /// Simulates the worker process exiting.
    pub fn kill(&self, id: WorkerId) {
        if let Some(flag) = self.alive.lock().unwrap().get(&id) {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_alive(&self, id: WorkerId) -> bool {
        self.alive
            .lock()
            .unwrap()
            .get(&id)
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Launch for FakeLauncher {
    async fn launch(&self, request: LaunchRequest<'_>) -> Result<LaunchedWorker, LaunchError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LaunchError::PortInUse { port: 7777 });
        }

        let pid = Self::pid_of(request.id);
        let alive = Arc::new(AtomicBool::new(true));
        self.alive.lock().unwrap().insert(request.id, alive.clone());
        self.launches
            .lock()
            .unwrap()
            .push((request.id, request.credential.delete_token.clone()));

        let code_loaded = self.code_loaded.load(Ordering::SeqCst);
        Ok(LaunchedWorker {
            process: Box::new(FakeProcess { pid, alive }),
            monitor: None,
            code_loaded,
            load_error: (!code_loaded)
                .then(|| LoadError::new(LoadErrorKind::ProcessAccessDenied, pid, "Backend.dll")),
            log_path: None,
        })
    }
}

/// Loader recording every call.
#[derive(Default)]
pub struct FakeLoader {
    calls: Mutex<Vec<(u32, PathBuf)>>,
}

impl FakeLoader {
    pub fn calls(&self) -> Vec<(u32, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

impl CodeLoader for FakeLoader {
    fn load_module(&self, pid: u32, module: &Path) -> Result<(), LoadError> {
        self.calls.lock().unwrap().push((pid, module.to_path_buf()));
        Ok(())
    }
}

pub struct Harness {
    pub orch: Orchestrator,
    pub cp: Arc<FakeControlPlane>,
    pub launcher: Arc<FakeLauncher>,
    pub loader: Arc<FakeLoader>,
}

/// Defaults tuned for tests: short second-stage delay, everything else as shipped.
pub fn config(max_instances: usize) -> FleetConfig {
    FleetConfig {
        max_instances,
        second_stage_delay: Duration::from_millis(10),
        ..FleetConfig::default()
    }
}

pub fn modules() -> ModuleSet {
    ModuleSet {
        first_stage: PathBuf::from("Backend.dll"),
        second_stage: vec![PathBuf::from("memory.dll"), PathBuf::from("server.dll")],
    }
}

pub fn harness(cfg: FleetConfig) -> Harness {
    let cp = Arc::new(FakeControlPlane::default());
    let launcher = Arc::new(FakeLauncher::default());
    let loader = Arc::new(FakeLoader::default());

    let orch = Orchestrator::builder(cfg)
        .with_control_plane(cp.clone())
        .with_launcher(launcher.clone())
        .with_loader(loader.clone())
        .with_modules(modules())
        .build()
        .unwrap();

    Harness {
        orch,
        cp,
        launcher,
        loader,
    }
}
