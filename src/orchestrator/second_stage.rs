//! # Second-stage module loading.
//!
//! Runs in its own task so a tick never sleeps between modules. The worker's
//! progress flag is already `InFlight` when the task starts; the task reports
//! back through the worker event queue and the orchestrator records the result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::{Bus, Event, EventKind, WorkerEvent, WorkerEventSender};
use crate::loader::CodeLoader;
use crate::registry::WorkerId;

pub(super) struct SecondStageLoad {
    pub id: WorkerId,
    pub pid: u32,
    pub modules: Arc<[PathBuf]>,
    pub delay: Duration,
    pub loader: Arc<dyn CodeLoader>,
    pub bus: Bus,
    pub events: WorkerEventSender,
    pub cancel: CancellationToken,
}

impl SecondStageLoad {
    /// Loads each module in order, pausing `delay` between them; stops at the first failure.
    pub(super) async fn run(self) {
        let mut result = Ok(());

        for (i, module) in self.modules.iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        debug!(worker = %self.id, "second-stage load cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(self.delay) => {}
                }
            }

            match self.loader.load_module(self.pid, module) {
                Ok(()) => self.bus.publish(
                    Event::new(EventKind::ModuleLoaded)
                        .with_worker(self.id)
                        .with_pid(self.pid)
                        .with_module(module),
                ),
                Err(e) => {
                    self.bus.publish(
                        Event::new(EventKind::ModuleLoadFailed)
                            .with_worker(self.id)
                            .with_pid(self.pid)
                            .with_module(module)
                            .with_reason(e.to_string()),
                    );
                    result = Err(e);
                    break;
                }
            }
        }

        let _ = self
            .events
            .send(WorkerEvent::SecondStageDone { id: self.id, result });
    }
}
