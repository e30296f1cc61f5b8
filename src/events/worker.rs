//! # Point-to-point events from worker-side tasks to the orchestrator.
//!
//! Unlike [`Event`](super::Event), these are not broadcast: they form an
//! unbounded queue drained by the orchestrator at the start of every tick,
//! so registry mutations stay serialised on the orchestrator side.

use tokio::sync::mpsc;

use crate::error::LoadError;
use crate::registry::WorkerId;

/// Something a worker-side task observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Authentication sentinel seen on the worker's output.
    AuthReady(WorkerId),
    /// Listening sentinel seen on the worker's output.
    Listening(WorkerId),
    /// Second-stage load task finished.
    SecondStageDone {
        id: WorkerId,
        result: Result<(), LoadError>,
    },
}

impl WorkerEvent {
    pub fn worker(&self) -> WorkerId {
        match self {
            WorkerEvent::AuthReady(id) | WorkerEvent::Listening(id) => *id,
            WorkerEvent::SecondStageDone { id, .. } => *id,
        }
    }
}

/// Producer half handed to monitors and load tasks.
pub type WorkerEventSender = mpsc::UnboundedSender<WorkerEvent>;
/// Consumer half owned by the orchestrator.
pub type WorkerEventReceiver = mpsc::UnboundedReceiver<WorkerEvent>;

/// Creates a worker event queue.
pub fn worker_channel() -> (WorkerEventSender, WorkerEventReceiver) {
    mpsc::unbounded_channel()
}
