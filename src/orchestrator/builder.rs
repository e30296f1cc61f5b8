use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::core::{Inner, Orchestrator};
use crate::config::{FleetConfig, ModuleSet};
use crate::control_plane::ControlPlane;
use crate::error::FleetError;
use crate::events::{Bus, worker_channel};
use crate::launcher::Launch;
use crate::loader::{CodeLoader, NativeLoader};
use crate::registry::Registry;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for an [`Orchestrator`].
///
/// A control plane and a launcher are mandatory; the loader defaults to
/// [`NativeLoader`] and the module set to "no modules".
pub struct OrchestratorBuilder {
    cfg: FleetConfig,
    control_plane: Option<Arc<dyn ControlPlane>>,
    launcher: Option<Arc<dyn Launch>>,
    loader: Option<Arc<dyn CodeLoader>>,
    first_stage: Option<PathBuf>,
    second_stage: Vec<PathBuf>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl OrchestratorBuilder {
    pub fn new(cfg: FleetConfig) -> Self {
        Self {
            cfg,
            control_plane: None,
            launcher: None,
            loader: None,
            first_stage: None,
            second_stage: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launch>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Loader used for second-stage modules.
    pub fn with_loader(mut self, loader: Arc<dyn CodeLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Module set: the first stage is only reported (the launcher loads it),
    /// the second stage is loaded by the orchestrator.
    pub fn with_modules(mut self, modules: ModuleSet) -> Self {
        self.first_stage = Some(modules.first_stage);
        self.second_stage = modules.second_stage;
        self
    }

    pub fn with_second_stage(mut self, modules: Vec<PathBuf>) -> Self {
        self.second_stage = modules;
        self
    }

    /// Sets event subscribers, each driven by its own bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the orchestrator. Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<Orchestrator, FleetError> {
        let control_plane = self
            .control_plane
            .ok_or_else(|| FleetError::ConfigurationMissing {
                what: "control plane".to_string(),
            })?;
        let launcher = self
            .launcher
            .ok_or_else(|| FleetError::ConfigurationMissing {
                what: "launcher".to_string(),
            })?;
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(NativeLoader::new()));

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = (!self.subscribers.is_empty())
            .then(|| Arc::new(SubscriberSet::new(self.subscribers, bus.clone())).listen());

        let (events_tx, events_rx) = worker_channel();
        let registry = Registry::new(self.cfg.max_instances);

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                cfg: self.cfg,
                bus,
                control_plane,
                launcher,
                loader,
                first_stage: self.first_stage,
                second_stage: self.second_stage.into(),
                registry: Mutex::new(registry),
                events_tx,
                events_rx: Mutex::new(events_rx),
                next_id: AtomicU64::new(1),
                loads: std::sync::Mutex::new(CancellationToken::new()),
                run: Mutex::new(None),
                listener,
            }),
        })
    }
}
