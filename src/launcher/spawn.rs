use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::port::ensure_port_free;
use super::process::ChildProcess;
use super::{Launch, LaunchRequest, LaunchedWorker};
use crate::config::LaunchSpec;
use crate::error::LaunchError;
use crate::loader::CodeLoader;
use crate::monitor::{OutputMonitor, WorkerLog};

/// Launches workers as child processes of this one.
pub struct ProcessLauncher {
    spec: LaunchSpec,
    loader: Arc<dyn CodeLoader>,
    first_stage: PathBuf,
}

impl ProcessLauncher {
    pub fn new(spec: LaunchSpec, loader: Arc<dyn CodeLoader>, first_stage: impl Into<PathBuf>) -> Self {
        Self {
            spec,
            loader,
            first_stage: first_stage.into(),
        }
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }
}

#[async_trait]
impl Launch for ProcessLauncher {
    async fn launch(&self, request: LaunchRequest<'_>) -> Result<LaunchedWorker, LaunchError> {
        let LaunchRequest {
            id,
            credential,
            events,
        } = request;

        let path = self.spec.executable_path();
        let exists = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !exists {
            return Err(LaunchError::ExecutableNotFound { path });
        }

        if let Some(port) = self.spec.free_port {
            ensure_port_free(port).await?;
        }

        // Opened before spawning so a log failure never leaves a process behind.
        let log_path = self.spec.log_path(id);
        let log = WorkerLog::open(&log_path)
            .await
            .map_err(|e| LaunchError::Other {
                reason: format!("opening log {}: {e}", log_path.display()),
            })?;

        let mut command = Command::new(&path);
        command
            .args(self.spec.render_args(credential))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = path.parent() {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|error| LaunchError::Spawn { error })?;
        let pid = child.id().ok_or_else(|| LaunchError::Other {
            reason: "worker exited before its pid was read".to_string(),
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(LaunchError::MissingStream { stream: "stdout" })?;
        let stderr = child
            .stderr
            .take()
            .ok_or(LaunchError::MissingStream { stream: "stderr" })?;

        let monitor = OutputMonitor::spawn(
            id,
            stdout,
            stderr,
            log,
            self.spec.sentinels.clone(),
            events,
        );
        debug!(worker = %id, pid, path = %path.display(), "worker spawned");

        let load_error = match self.loader.load_module(pid, &self.first_stage) {
            Ok(()) => None,
            Err(e) => {
                warn!(worker = %id, pid, error = %e, "first-stage load failed");
                Some(e)
            }
        };

        Ok(LaunchedWorker {
            process: Box::new(ChildProcess::new(pid, child)),
            monitor: Some(monitor),
            code_loaded: load_error.is_none(),
            load_error,
            log_path: Some(log_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::control_plane::Credential;
    use crate::error::LoadErrorKind;
    use crate::events::{WorkerEvent, worker_channel};
    use crate::launcher::ProcessStatus;
    use crate::loader::UnsupportedLoader;
    use crate::registry::WorkerId;

    fn credential() -> Credential {
        Credential::new("srv1", "srv1@example.com", "pw", "tok")
    }

    #[tokio::test]
    async fn missing_executable_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let spec = LaunchSpec::new(dir.path(), dir.path().join("logs")).with_executable("nope");
        let launcher = ProcessLauncher::new(spec, Arc::new(UnsupportedLoader), "Backend.dll");
        let (tx, _rx) = worker_channel();
        let cred = credential();

        let err = launcher
            .launch(LaunchRequest {
                id: WorkerId(1),
                credential: &cred,
                events: tx,
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LaunchError::ExecutableNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawns_monitors_and_records_failed_first_stage() {
        let dir = tempfile::tempdir().unwrap();
        let spec = LaunchSpec::new("/bin", dir.path().join("logs"))
            .with_executable("sh")
            .with_args([
                "-c",
                "echo 'Successfully logged in user {username}'; echo 'listening on port 7777' 1>&2",
            ]);
        let launcher = ProcessLauncher::new(spec, Arc::new(UnsupportedLoader), "Backend.dll");
        let (tx, mut rx) = worker_channel();
        let cred = credential();

        let mut launched = launcher
            .launch(LaunchRequest {
                id: WorkerId(5),
                credential: &cred,
                events: tx,
            })
            .await
            .unwrap();
        assert!(!launched.code_loaded);
        assert_eq!(
            launched.load_error.as_ref().map(|e| e.kind),
            Some(LoadErrorKind::Unsupported)
        );

        let mut monitor = launched.monitor.take().unwrap();
        tokio::time::timeout(Duration::from_secs(10), monitor.finished())
            .await
            .unwrap();
        monitor.stop().await;

        let mut seen = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            seen.push(ev);
        }
        assert!(seen.contains(&WorkerEvent::AuthReady(WorkerId(5))));
        assert!(seen.contains(&WorkerEvent::Listening(WorkerId(5))));

        let log_path = launched.log_path.clone().unwrap();
        assert!(log_path.ends_with("worker-5.log"));
        let text = std::fs::read_to_string(log_path).unwrap();
        assert!(text.contains("Successfully logged in user srv1"));

        let status = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match launched.process.status() {
                    ProcessStatus::Alive => tokio::time::sleep(Duration::from_millis(20)).await,
                    other => break other,
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(status, ProcessStatus::Exited(Some(0)));
        assert!(launched.process.terminate().await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unwritable_log_fails_before_anything_is_spawned() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("logs");
        std::fs::write(&blocked, b"a file, not a directory").unwrap();
        let marker = dir.path().join("spawned");

        let spec = LaunchSpec::new("/bin", &blocked)
            .with_executable("sh")
            .with_args(["-c".to_string(), format!("touch {}", marker.display())]);
        let launcher = ProcessLauncher::new(spec, Arc::new(UnsupportedLoader), "Backend.dll");
        let (tx, _rx) = worker_channel();
        let cred = credential();

        let err = launcher
            .launch(LaunchRequest {
                id: WorkerId(6),
                credential: &cred,
                events: tx,
            })
            .await
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "launch_failed");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!marker.exists());
    }
}
