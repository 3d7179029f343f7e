// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use conductor_core::{paths, RunInfo, RunStatus};
use conductor_storage::read_run_info;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::tailer::{line_boundary, LogLine, TailFrom, Tailer};
use super::{Cursor, DonePayload, LogPayload, LogStream, StatusPayload, StreamError, StreamEvent};

/// Per-subscriber backlog before a slow client starts losing events.
const BROADCAST_CAPACITY: usize = 1024;
const LINE_BUFFER: usize = 256;

/// What a subscriber sees before its first live event.
#[derive(Debug, Default, Clone)]
pub(super) struct Snapshot {
    pub status: Option<StreamEvent>,
    pub done: Option<StreamEvent>,
}

#[derive(Debug)]
struct Shared {
    project_id: String,
    task_id: String,
    cursor: Cursor,
    snapshot: Snapshot,
}

/// Tailers and status polling for one run, shared by all its subscribers.
#[derive(Debug)]
pub(super) struct RunStream {
    run_id: String,
    tx: broadcast::Sender<StreamEvent>,
    shared: Arc<Mutex<Shared>>,
    cancel: CancellationToken,
}

impl RunStream {
    /// Start tailing the run in `run_dir` from the current end of its files.
    pub fn start(
        run_id: &str,
        run_dir: &Path,
        poll_interval: Duration,
    ) -> Result<Arc<Self>, StreamError> {
        let info_path = paths::run_info_path(run_dir);
        let info = read_run_info(&info_path).ok();
        let (project_id, task_id) = match (&info, paths::scope_from_run_info_path(&info_path)) {
            (Some(info), _) => (info.project_id.clone(), info.task_id.clone()),
            (None, Some((project_id, task_id, _))) => (project_id, task_id),
            (None, None) => (String::new(), String::new()),
        };

        let recorded_stdout = info.as_ref().and_then(|i| i.stdout_path.as_deref());
        let recorded_stderr = info.as_ref().and_then(|i| i.stderr_path.as_deref());
        let stdout_path = output_path(run_dir, recorded_stdout, paths::STDOUT_FILE);
        let stderr_path = output_path(run_dir, recorded_stderr, paths::STDERR_FILE);
        let (stdout_lines, stdout_offset) = line_boundary(&stdout_path)?;
        let (stderr_lines, stderr_offset) = line_boundary(&stderr_path)?;

        let cancel = CancellationToken::new();
        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        let stdout_from = TailFrom::Offset(stdout_offset);
        Tailer::new(stdout_path, run_id, LogStream::Stdout, stdout_from, line_tx.clone())?
            .spawn(poll_interval, cancel.child_token());
        let stderr_from = TailFrom::Offset(stderr_offset);
        Tailer::new(stderr_path, run_id, LogStream::Stderr, stderr_from, line_tx)?
            .spawn(poll_interval, cancel.child_token());

        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let stream = Arc::new(Self {
            run_id: run_id.to_string(),
            tx: tx.clone(),
            shared: Arc::new(Mutex::new(Shared {
                project_id,
                task_id,
                cursor: Cursor::new(stdout_lines, stderr_lines),
                snapshot: Snapshot::default(),
            })),
            cancel: cancel.clone(),
        });
        tracing::debug!(run_id, stdout_lines, stderr_lines, "run stream started");

        let worker = Worker {
            run_id: run_id.to_string(),
            info_path,
            tx,
            shared: Arc::clone(&stream.shared),
            last: None,
            last_error: None,
            finishing: false,
        };
        tokio::spawn(worker.run(line_rx, poll_interval, cancel));
        Ok(stream)
    }

    /// A receiver for live events plus what happened before it existed.
    pub fn subscribe(&self) -> (Snapshot, broadcast::Receiver<StreamEvent>) {
        let shared = self.shared.lock();
        (shared.snapshot.clone(), self.tx.subscribe())
    }

    pub fn cursor(&self) -> Cursor {
        self.shared.lock().cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(run_id = %self.run_id, "run stream stopped");
            self.cancel.cancel();
        }
    }
}

fn output_path(run_dir: &Path, recorded: Option<&str>, default: &str) -> PathBuf {
    match recorded.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => run_dir.join(default),
    }
}

struct Worker {
    run_id: String,
    info_path: PathBuf,
    tx: broadcast::Sender<StreamEvent>,
    shared: Arc<Mutex<Shared>>,
    last: Option<(RunStatus, i32)>,
    last_error: Option<String>,
    /// Terminal status seen; `done` goes out on the next tick so the
    /// tailers get one more poll at the final output.
    finishing: bool,
}

impl Worker {
    async fn run(
        mut self,
        mut lines: mpsc::Receiver<LogLine>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(line) = lines.recv() => self.publish_line(line),
                _ = ticker.tick() => {
                    if self.check_status() {
                        while let Ok(line) = lines.try_recv() {
                            self.publish_line(line);
                        }
                        self.publish_done();
                        break;
                    }
                }
            }
        }
        cancel.cancel();
    }

    fn publish_line(&self, line: LogLine) {
        let mut shared = self.shared.lock();
        shared.cursor.advance(line.stream);
        let event = StreamEvent::Log {
            cursor: shared.cursor,
            payload: LogPayload {
                run_id: line.run_id,
                project_id: shared.project_id.clone(),
                task_id: shared.task_id.clone(),
                stream: line.stream,
                line: line.line,
                timestamp: line.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            },
        };
        // No receivers is fine; the last one leaving stops this worker.
        let _ = self.tx.send(event);
    }

    /// Poll the run record. Returns true once `done` should be sent.
    fn check_status(&mut self) -> bool {
        let info = match read_run_info(&self.info_path) {
            Ok(info) => info,
            Err(e) => {
                let error = e.to_string();
                if self.last_error.as_deref() != Some(error.as_str()) {
                    tracing::debug!(run_id = %self.run_id, error = %error, "run-info unreadable");
                    let _ = self.tx.send(StreamEvent::Error {
                        run_id: Some(self.run_id.clone()),
                        error: error.clone(),
                    });
                    self.last_error = Some(error);
                }
                return false;
            }
        };
        self.last_error = None;

        if self.last != Some((info.status, info.exit_code)) {
            self.last = Some((info.status, info.exit_code));
            self.publish_status(&info);
        }
        if !info.status.is_terminal() {
            self.finishing = false;
            return false;
        }
        if self.finishing {
            return true;
        }
        self.finishing = true;
        false
    }

    fn publish_status(&self, info: &RunInfo) {
        let mut shared = self.shared.lock();
        if !info.project_id.is_empty() {
            shared.project_id = info.project_id.clone();
        }
        if !info.task_id.is_empty() {
            shared.task_id = info.task_id.clone();
        }
        let event = StreamEvent::Status(StatusPayload {
            run_id: self.run_id.clone(),
            project_id: shared.project_id.clone(),
            task_id: shared.task_id.clone(),
            status: info.status,
            exit_code: info.exit_code,
        });
        shared.snapshot.status = Some(event.clone());
        let _ = self.tx.send(event);
    }

    fn publish_done(&self) {
        let Some((status, exit_code)) = self.last else {
            return;
        };
        let mut shared = self.shared.lock();
        let event =
            StreamEvent::Done(DonePayload { run_id: self.run_id.clone(), status, exit_code });
        shared.snapshot.done = Some(event.clone());
        let _ = self.tx.send(event);
    }
}
