//! # LogWriter: fleet events rendered through `tracing`.
//!
//! ## Example output
//! ```text
//! INFO  worker launched worker=w3 pid=4242
//! WARN  worker crashed before ready worker=w3 pid=4242 reason="state=CodeLoaded exit=Some(1)"
//! INFO  worker relaunched worker=w4 pid=4250 reason="replaces w3"
//! INFO  worker ready worker=w4 pid=4250
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.map(|w| w.to_string());
        let worker = worker.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let module = e.module.as_deref().unwrap_or("");

        match e.kind {
            EventKind::ScaleUpSkipped => debug!(reason, "scale-up skipped"),
            EventKind::DemandPolled => debug!(reason, "demand polled"),
            EventKind::PollFailed => warn!(reason, "demand poll failed"),
            EventKind::CredentialProvisioned => info!(worker, "credential provisioned"),
            EventKind::ProvisionFailed => warn!(reason, "credential provisioning failed"),
            EventKind::WorkerLaunched => info!(worker, pid = e.pid, "worker launched"),
            EventKind::LaunchFailed => error!(worker, reason, "worker launch failed"),
            EventKind::ModuleLoaded => info!(worker, pid = e.pid, module, "module loaded"),
            EventKind::ModuleLoadFailed => {
                error!(worker, pid = e.pid, module, reason, "module load failed")
            }
            EventKind::AuthReady => info!(worker, "worker authenticated"),
            EventKind::Listening => info!(worker, "worker listening"),
            EventKind::WorkerReady => info!(worker, pid = e.pid, "worker ready"),
            EventKind::CrashBeforeReady => {
                warn!(worker, pid = e.pid, reason, "worker crashed before ready")
            }
            EventKind::CrashAfterReady => info!(worker, pid = e.pid, reason, "worker exited"),
            EventKind::WorkerRelaunched => {
                info!(worker, pid = e.pid, reason, "worker relaunched")
            }
            EventKind::CredentialRevoked => info!(worker, "credential revoked"),
            EventKind::RevokeFailed => warn!(worker, reason, "credential revocation failed"),
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::WorkerTerminated => info!(worker, pid = e.pid, "worker terminated"),
            EventKind::TerminateFailed => {
                warn!(worker, pid = e.pid, reason, "worker termination failed")
            }
            EventKind::SubscriberOverflow => warn!(reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => error!(reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
