//! # OutputMonitor: per-worker stream readers with sentinel detection.
//!
//! ```text
//! stdout ──► reader task ──┐                 ┌──► WorkerLog::append("[ts] line")
//!                          ├──► each line ───┤
//! stderr ──► reader task ──┘                 └──► SentinelWatch::observe
//!                                                     └──► WorkerEvent ──► orchestrator
//! ```
//!
//! ## Rules
//! - A reader ends on EOF (process exit), on a read error, or when stopped.
//! - Each sentinel fires at most once per worker, across both streams.
//! - `stop()` is idempotent: cancel the running token, then close the log once.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::log::WorkerLog;
use super::sentinel::{Milestone, SentinelWatch};
use crate::config::Sentinels;
use crate::events::{WorkerEvent, WorkerEventSender};
use crate::registry::WorkerId;

/// Watches the two output streams of one worker.
pub struct OutputMonitor {
    id: WorkerId,
    running: CancellationToken,
    log: Arc<WorkerLog>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputMonitor {
    /// Spawns one reader task per stream.
    pub fn spawn<O, E>(
        id: WorkerId,
        stdout: O,
        stderr: E,
        log: WorkerLog,
        sentinels: Sentinels,
        events: WorkerEventSender,
    ) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let running = CancellationToken::new();
        let log = Arc::new(log);
        let watch = Arc::new(SentinelWatch::new(sentinels));

        let readers = vec![
            tokio::spawn(read_stream(
                Reader::new(id, "stdout", &log, &watch, &events, &running),
                stdout,
            )),
            tokio::spawn(read_stream(
                Reader::new(id, "stderr", &log, &watch, &events, &running),
                stderr,
            )),
        ];

        Self {
            id,
            running,
            log,
            readers,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_cancelled()
    }

    /// Stops both readers and closes the log. Safe to call any number of times.
    pub async fn stop(&self) {
        self.running.cancel();
        if self.log.close().await {
            debug!(worker = %self.id, "output monitor stopped");
        }
    }

    /// Waits until both readers have ended (EOF, error or stop).
    pub async fn finished(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }
    }
}

impl Drop for OutputMonitor {
    fn drop(&mut self) {
        self.running.cancel();
    }
}

/// Everything one reader task needs.
struct Reader {
    id: WorkerId,
    stream: &'static str,
    log: Arc<WorkerLog>,
    watch: Arc<SentinelWatch>,
    events: WorkerEventSender,
    running: CancellationToken,
}

impl Reader {
    fn new(
        id: WorkerId,
        stream: &'static str,
        log: &Arc<WorkerLog>,
        watch: &Arc<SentinelWatch>,
        events: &WorkerEventSender,
        running: &CancellationToken,
    ) -> Self {
        Self {
            id,
            stream,
            log: Arc::clone(log),
            watch: Arc::clone(watch),
            events: events.clone(),
            running: running.clone(),
        }
    }

    async fn handle_line(&self, line: &str) {
        debug!(worker = %self.id, stream = self.stream, "{line}");
        if let Err(e) = self.log.append(line).await {
            debug!(worker = %self.id, error = %e, "worker log append failed");
        }

        for milestone in self.watch.observe(line) {
            let ev = match milestone {
                Milestone::AuthReady => WorkerEvent::AuthReady(self.id),
                Milestone::Listening => WorkerEvent::Listening(self.id),
            };
            // Receiver gone means the orchestrator shut down.
            let _ = self.events.send(ev);
        }
    }
}

async fn read_stream<R>(reader: Reader, stream: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut stream = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        let read = tokio::select! {
            biased;
            _ = reader.running.cancelled() => break,
            read = stream.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {
                // Undecodable bytes are replaced; they never end the reader.
                let text = String::from_utf8_lossy(&buf);
                reader
                    .handle_line(text.trim_end_matches(|c: char| c == '\n' || c == '\r'))
                    .await;
                buf.clear();
            }
            Err(e) => {
                debug!(worker = %reader.id, stream = reader.stream, error = %e, "read failed");
                break;
            }
        }
    }
}
