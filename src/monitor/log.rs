//! # Per-worker append-only output log.
//!
//! Lines are written as `[YYYY-MM-DD HH:MM:SS] <raw line>`. Both stream readers
//! append under the same lock, so lines interleave in arrival order.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Exclusively owned log destination of one worker; closed exactly once.
#[derive(Debug)]
pub struct WorkerLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl WorkerLog {
    /// Opens (creating or appending to) the log at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one timestamped line. Writes after `close` are dropped.
    pub async fn append(&self, line: &str) -> std::io::Result<()> {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let entry = format!("[{stamp}] {line}\n");

        let mut guard = self.file.lock().await;
        match guard.as_mut() {
            Some(file) => file.write_all(entry.as_bytes()).await,
            None => Ok(()),
        }
    }

    /// Flushes and closes the file. Returns `true` only for the call that closed it.
    pub async fn close(&self) -> bool {
        let mut guard = self.file.lock().await;
        match guard.take() {
            Some(mut file) => {
                let _ = file.flush().await;
                true
            }
            None => false,
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.file.lock().await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_timestamped_lines_and_closes_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = WorkerLog::open(dir.path().join("w1.log")).await.unwrap();

        log.append("hello").await.unwrap();
        assert!(log.close().await);
        assert!(!log.close().await);
        log.append("after close").await.unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] hello"));
        // "[YYYY-MM-DD HH:MM:SS] " prefix
        assert_eq!(lines[0].find(']'), Some(20));
    }
}
