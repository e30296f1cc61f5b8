//! # One orchestration tick.
//!
//! ```text
//! tick()
//!   1. drain worker events      AuthReady / Listening / SecondStageDone → registry
//!   2. gating                   full? → in wait window? → in setup?  (first hit wins)
//!   3. scale-up                 poll demand → provision credential → launch → insert
//!   4. sweep                    exited workers → crash policy → relaunch or revoke
//!   5. setup timeout            overdue workers are terminated (reclaimed by a later sweep)
//!   6. second stage             sweep-triggered loads for eligible workers
//!   7. promotion                SteadyStateWait → Ready once dwell has elapsed
//! ```
//!
//! ## Rules
//! - The registry lock is never held across a control-plane call.
//! - A failure for one worker never aborts the rest of the tick.
//! - Nothing here sleeps: second-stage loads run in their own tasks.

use tokio::time::Instant;
use tracing::{debug, warn};

use super::core::Orchestrator;
use crate::events::{Event, EventKind, WorkerEvent};
use crate::policies::{CrashDecision, ExitClass};
use crate::registry::{ExitedWorker, Registry, RetiredWorker, WorkerId};

/// Why scale-up was skipped this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The registry holds `max_instances` workers.
    AtCapacity,
    /// Some worker is inside its dwell window.
    InWaitWindow,
    /// Some worker has not reached `Ready`.
    InSetup,
}

impl SkipReason {
    pub fn as_label(&self) -> &'static str {
        match self {
            SkipReason::AtCapacity => "at_capacity",
            SkipReason::InWaitWindow => "in_wait_window",
            SkipReason::InSetup => "in_setup",
        }
    }
}

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Worker events applied at the start of the tick.
    pub events: usize,
    pub skipped: Option<SkipReason>,
    /// Demand answer, if the control plane was polled successfully.
    pub demand: Option<bool>,
    pub launched: Option<WorkerId>,
    /// Exited workers that never listened.
    pub crashed_before_ready: Vec<WorkerId>,
    /// Exited workers whose credential was released.
    pub reclaimed: Vec<WorkerId>,
    /// `(crashed, replacement)` pairs.
    pub relaunched: Vec<(WorkerId, WorkerId)>,
    /// Workers terminated for exceeding the setup timeout.
    pub timed_out: Vec<WorkerId>,
    pub second_stage_started: Vec<WorkerId>,
    pub promoted: Vec<WorkerId>,
}

impl Orchestrator {
    /// Runs a single tick.
    ///
    /// The background loop calls this every `tick_interval`; tests and embedders
    /// may call it directly to drive the orchestrator deterministically.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let mut rx = self.inner.events_rx.lock().await;
        while let Ok(ev) = rx.try_recv() {
            self.apply_worker_event(ev).await;
            report.events += 1;
        }

        report.skipped = self.gate().await;
        match report.skipped {
            Some(reason) => {
                self.inner.bus.publish(
                    Event::new(EventKind::ScaleUpSkipped).with_reason(reason.as_label()),
                );
            }
            None => self.scale_up(&mut report).await,
        }

        self.sweep(&mut report).await;
        self.enforce_setup_timeout(&mut report).await;

        let now = Instant::now();
        let mut registry = self.inner.registry.lock().await;
        if self.inner.cfg.second_stage_trigger.on_sweep() {
            for id in registry.second_stage_candidates() {
                if self.start_second_stage(&mut registry, id) {
                    report.second_stage_started.push(id);
                }
            }
        }

        report.promoted = registry.promote_ready(now, self.inner.cfg.dwell);
        for &id in &report.promoted {
            let pid = registry.get(id).map(|w| w.pid());
            let mut ev = Event::new(EventKind::WorkerReady).with_worker(id);
            if let Some(pid) = pid {
                ev = ev.with_pid(pid);
            }
            self.inner.bus.publish(ev);
        }
        drop(registry);
        drop(rx);

        debug!(?report, "tick finished");
        report
    }

    /// Waits for the next worker event without applying it. Cancel-safe.
    pub(super) async fn recv_event(&self) -> Option<WorkerEvent> {
        self.inner.events_rx.lock().await.recv().await
    }

    pub(super) async fn apply_worker_event(&self, ev: WorkerEvent) {
        let mut registry = self.inner.registry.lock().await;
        match ev {
            WorkerEvent::AuthReady(id) => match registry.mark_authenticated(id) {
                Some(Ok(())) => {
                    self.inner
                        .bus
                        .publish(Event::new(EventKind::AuthReady).with_worker(id));
                    if self.inner.cfg.second_stage_trigger.on_authentication() {
                        self.start_second_stage(&mut registry, id);
                    }
                }
                Some(Err(e)) => warn!(worker = %id, error = %e, "authentication sentinel ignored"),
                None => debug!(worker = %id, "authentication sentinel for untracked worker"),
            },
            WorkerEvent::Listening(id) => match registry.mark_listening(id, Instant::now()) {
                Some(Ok(())) => {
                    self.inner
                        .bus
                        .publish(Event::new(EventKind::Listening).with_worker(id));
                }
                Some(Err(e)) => warn!(worker = %id, error = %e, "listening sentinel ignored"),
                None => debug!(worker = %id, "listening sentinel for untracked worker"),
            },
            WorkerEvent::SecondStageDone { id, result } => {
                if !registry.finish_second_stage(id, result.is_ok()) {
                    debug!(worker = %id, "second-stage result for untracked worker");
                }
            }
        }
    }

    async fn gate(&self) -> Option<SkipReason> {
        let registry = self.inner.registry.lock().await;
        skip_reason(&registry, Instant::now(), self.inner.cfg.dwell)
    }

    async fn scale_up(&self, report: &mut TickReport) {
        let cp = &self.inner.control_plane;
        match cp.poll_demand().await {
            Ok(demand) => {
                report.demand = Some(demand);
                self.inner.bus.publish(
                    Event::new(EventKind::DemandPolled)
                        .with_reason(if demand { "scale" } else { "idle" }),
                );
                if !demand {
                    return;
                }
            }
            Err(e) => {
                self.inner.bus.publish(
                    Event::new(EventKind::PollFailed).with_reason(e.to_string()),
                );
                return;
            }
        }

        let id = self.next_worker_id();
        let credential = match cp.provision_credential().await {
            Ok(c) => c,
            Err(e) => {
                self.inner.bus.publish(
                    Event::new(EventKind::ProvisionFailed).with_reason(e.to_string()),
                );
                return;
            }
        };
        self.inner
            .bus
            .publish(Event::new(EventKind::CredentialProvisioned).with_worker(id));

        match self.launch(id, &credential).await {
            Ok(launched) => {
                let pid = launched.process.pid();
                let registered = {
                    let mut registry = self.inner.registry.lock().await;
                    self.register(id, credential, launched, 0, &mut registry)
                };
                match registered {
                    Ok(()) => {
                        self.inner.bus.publish(
                            Event::new(EventKind::WorkerLaunched)
                                .with_worker(id)
                                .with_pid(pid),
                        );
                        report.launched = Some(id);
                    }
                    Err(refused) => self.discard(refused).await,
                }
            }
            Err(e) => {
                self.inner.bus.publish(
                    Event::new(EventKind::LaunchFailed)
                        .with_worker(id)
                        .with_reason(e.to_string()),
                );
                self.revoke(id, credential).await;
            }
        }
    }

    async fn sweep(&self, report: &mut TickReport) {
        let sweep = self.inner.registry.lock().await.take_exited();
        for id in sweep.unknown {
            debug!(worker = %id, "process status unknown; kept");
        }
        for exited in sweep.exited {
            self.reclaim(exited, report).await;
        }
    }

    async fn reclaim(&self, exited: ExitedWorker, report: &mut TickReport) {
        let ExitedWorker {
            worker,
            last_state,
            exit_code,
        } = exited;
        let RetiredWorker {
            id,
            pid,
            credential,
            relaunches,
            process,
            monitor,
        } = worker;
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
        drop(process);

        let class = ExitClass::classify(last_state);
        let kind = match class {
            ExitClass::CrashBeforeReady => {
                report.crashed_before_ready.push(id);
                EventKind::CrashBeforeReady
            }
            ExitClass::CrashAfterReady => EventKind::CrashAfterReady,
        };
        self.inner.bus.publish(
            Event::new(kind)
                .with_worker(id)
                .with_pid(pid)
                .with_reason(format!("state={last_state:?} exit={exit_code:?}")),
        );

        match self.inner.cfg.crash_policy.decide(class, relaunches) {
            CrashDecision::Relaunch => {
                let new_id = self.next_worker_id();
                match self.launch(new_id, &credential).await {
                    Ok(launched) => {
                        let new_pid = launched.process.pid();
                        let registered = {
                            let mut registry = self.inner.registry.lock().await;
                            self.register(new_id, credential, launched, relaunches + 1, &mut registry)
                        };
                        match registered {
                            Ok(()) => {
                                self.inner.bus.publish(
                                    Event::new(EventKind::WorkerRelaunched)
                                        .with_worker(new_id)
                                        .with_pid(new_pid)
                                        .with_reason(format!("replaces {id}")),
                                );
                                report.relaunched.push((id, new_id));
                            }
                            Err(refused) => {
                                self.discard(refused).await;
                                report.reclaimed.push(id);
                            }
                        }
                    }
                    Err(e) => {
                        self.inner.bus.publish(
                            Event::new(EventKind::LaunchFailed)
                                .with_worker(new_id)
                                .with_reason(format!("relaunch of {id}: {e}")),
                        );
                        self.revoke(id, credential).await;
                        report.reclaimed.push(id);
                    }
                }
            }
            CrashDecision::Reclaim => {
                self.revoke(id, credential).await;
                report.reclaimed.push(id);
            }
        }
    }

    async fn enforce_setup_timeout(&self, report: &mut TickReport) {
        let Some(timeout) = self.inner.cfg.setup_timeout else {
            return;
        };
        let mut registry = self.inner.registry.lock().await;
        for id in registry.overdue(Instant::now(), timeout) {
            let pid = registry.get(id).map(|w| w.pid()).unwrap_or_default();
            match registry.terminate(id).await {
                Some(Ok(())) => {
                    self.inner.bus.publish(
                        Event::new(EventKind::WorkerTerminated)
                            .with_worker(id)
                            .with_pid(pid)
                            .with_reason("setup timeout"),
                    );
                    report.timed_out.push(id);
                }
                Some(Err(e)) => {
                    self.inner.bus.publish(
                        Event::new(EventKind::TerminateFailed)
                            .with_worker(id)
                            .with_pid(pid)
                            .with_reason(format!("setup timeout: {e}")),
                    );
                }
                None => {}
            }
        }
    }
}

/// Scale-up gating; the first matching reason wins.
fn skip_reason(registry: &Registry, now: Instant, dwell: std::time::Duration) -> Option<SkipReason> {
    if registry.is_full() {
        Some(SkipReason::AtCapacity)
    } else if registry.any_in_wait_window(now, dwell) {
        Some(SkipReason::InWaitWindow)
    } else if registry.any_in_setup() {
        Some(SkipReason::InSetup)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_is_not_gated() {
        let registry = Registry::new(2);
        assert_eq!(
            skip_reason(&registry, Instant::now(), std::time::Duration::from_secs(70)),
            None
        );
    }

    #[test]
    fn zero_capacity_is_always_at_capacity() {
        let registry = Registry::new(0);
        assert_eq!(
            skip_reason(&registry, Instant::now(), std::time::Duration::from_secs(70)),
            Some(SkipReason::AtCapacity)
        );
    }
}
