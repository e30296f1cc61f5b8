use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Sentinels;

/// Lifecycle milestone announced by a sentinel line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    AuthReady,
    Listening,
}

/// Sentinel matcher shared by both readers of one worker.
///
/// Each milestone fires at most once per worker, whichever stream sees it first.
#[derive(Debug)]
pub(crate) struct SentinelWatch {
    sentinels: Sentinels,
    auth_fired: AtomicBool,
    listening_fired: AtomicBool,
}

impl SentinelWatch {
    pub fn new(sentinels: Sentinels) -> Self {
        Self {
            sentinels,
            auth_fired: AtomicBool::new(false),
            listening_fired: AtomicBool::new(false),
        }
    }

    /// Milestones this line fires for the first time.
    pub fn observe(&self, line: &str) -> Vec<Milestone> {
        let mut fired = Vec::new();
        if line.contains(&self.sentinels.auth_ready) && !self.auth_fired.swap(true, Ordering::AcqRel)
        {
            fired.push(Milestone::AuthReady);
        }
        if line.contains(&self.sentinels.listening)
            && !self.listening_fired.swap(true, Ordering::AcqRel)
        {
            fired.push(Milestone::Listening);
        }
        fired
    }
}
