use std::io;

use async_trait::async_trait;
use tokio::process::Child;
use tracing::debug;

use super::{ProcessStatus, WorkerProcess};

/// A worker spawned by this process, tracked through its owned child handle.
///
/// Status comes from the handle rather than a pid lookup, so a recycled pid
/// can never be mistaken for this worker.
#[derive(Debug)]
pub struct ChildProcess {
    pid: u32,
    child: Child,
}

impl ChildProcess {
    pub fn new(pid: u32, child: Child) -> Self {
        Self { pid, child }
    }
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn status(&mut self) -> ProcessStatus {
        match self.child.try_wait() {
            Ok(None) => ProcessStatus::Alive,
            Ok(Some(exit)) => ProcessStatus::Exited(exit.code()),
            Err(e) => {
                debug!(pid = self.pid, error = %e, "process status query failed");
                ProcessStatus::Unknown
            }
        }
    }

    async fn terminate(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await
    }
}
