//! # Crash policy for exited workers.
//!
//! Every worker found exited by the sweep is classified by the last lifecycle
//! state it reached, then [`CrashPolicy`] decides what happens to it.
//!
//! ```text
//! last state  <  Listening ──► CrashBeforeReady ──► Relaunch (same credential, new id)
//!                                               └─► Reclaim  (relaunch budget spent)
//! last state  >= Listening ──► CrashAfterReady  ──► Reclaim  (revoke credential)
//! ```
//!
//! A relaunch is one attempt per crash event; if it fails the credential is revoked.

use crate::registry::LifecycleState;

/// How an exited worker is classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitClass {
    /// The worker never printed its listening sentinel.
    CrashBeforeReady,
    /// The worker had started listening (post-ready crash or normal shutdown).
    CrashAfterReady,
}

impl ExitClass {
    /// Classifies an exit by the last state the worker reached.
    ///
    /// # Example
    /// ```
    /// use fleetvisor::{ExitClass, LifecycleState};
    ///
    /// assert_eq!(ExitClass::classify(LifecycleState::CodeLoaded), ExitClass::CrashBeforeReady);
    /// assert_eq!(ExitClass::classify(LifecycleState::SteadyStateWait), ExitClass::CrashAfterReady);
    /// ```
    pub fn classify(last_state: LifecycleState) -> Self {
        if last_state.has_listened() {
            ExitClass::CrashAfterReady
        } else {
            ExitClass::CrashBeforeReady
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            ExitClass::CrashBeforeReady => "crash_before_ready",
            ExitClass::CrashAfterReady => "crash_after_ready",
        }
    }
}

/// What to do with an exited worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrashDecision {
    /// Launch one replacement with the same credential.
    Relaunch,
    /// Drop the worker and revoke its credential.
    Reclaim,
}

/// Policy bounding relaunches per credential.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CrashPolicy {
    /// Maximum relaunches for one credential; `None` means unbounded.
    pub max_relaunches: Option<u32>,
}

impl CrashPolicy {
    /// Unbounded relaunches (default).
    pub const fn unbounded() -> Self {
        Self {
            max_relaunches: None,
        }
    }

    /// At most `n` relaunches per credential.
    pub const fn bounded(n: u32) -> Self {
        Self {
            max_relaunches: Some(n),
        }
    }

    /// Decides the fate of a worker that already used `relaunches` relaunches.
    pub fn decide(&self, class: ExitClass, relaunches: u32) -> CrashDecision {
        match class {
            ExitClass::CrashAfterReady => CrashDecision::Reclaim,
            ExitClass::CrashBeforeReady => match self.max_relaunches {
                Some(max) if relaunches >= max => CrashDecision::Reclaim,
                _ => CrashDecision::Relaunch,
            },
        }
    }
}
