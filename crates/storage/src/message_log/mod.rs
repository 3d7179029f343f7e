// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only message log shared by many writer processes.
//!
//! Every append takes an exclusive advisory lock on the log file, repairs a
//! trailing partial record left by a crashed writer, writes one complete
//! record, and releases the lock. Readers never lock: they parse the file
//! and ignore any fragment after the last complete record.

mod codec;
mod lock;

pub use conductor_core::generate_message_id;
pub use lock::{lock_exclusive, unlock, LockError, LockGuard, LOCK_POLL_INTERVAL};

use conductor_core::{format_stamp, Clock, Message, MessageType, SystemClock};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// First read-back size when looking for the last complete record.
const TAIL_WINDOW: u64 = 64 * 1024;

/// Errors from message log operations.
#[derive(Debug, Error)]
pub enum MessageLogError {
    #[error("timed out locking {path} after {attempts} attempts")]
    LockTimeout { path: PathBuf, attempts: u32 },
    #[error("since id not found: {0}")]
    SinceIdNotFound(String),
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    #[error("invalid message log path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Tunables for a [`MessageLog`].
#[derive(Debug, Clone)]
pub struct MessageLogOptions {
    /// Upper bound for a single lock attempt.
    pub lock_timeout: Duration,
    /// Sleep between re-reads in [`MessageLog::poll_for_new`].
    pub poll_interval: Duration,
    /// Total lock attempts per append, at least one.
    pub max_retries: u32,
    /// Sleep before the second attempt, doubled for each later one.
    pub retry_backoff: Duration,
    pub fsync: bool,
    /// Archive and truncate the file once it reaches this size.
    pub auto_rotate_bytes: Option<u64>,
}

impl Default for MessageLogOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            fsync: false,
            auto_rotate_bytes: None,
        }
    }
}

impl MessageLogOptions {
    conductor_core::setters! {
        set {
            lock_timeout: Duration,
            poll_interval: Duration,
            max_retries: u32,
            retry_backoff: Duration,
            fsync: bool,
        }
        option {
            auto_rotate_bytes: u64,
        }
    }
}

/// Snapshot of lock contention counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentionStats {
    /// Lock attempts made by appends.
    pub lock_waits: u64,
    /// Attempts that ran into `lock_timeout`.
    pub lock_timeouts: u64,
    /// Attempts after the first for the same append.
    pub retries: u64,
    /// Time spent waiting for the lock, successful or not.
    pub total_wait: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    lock_waits: AtomicU64,
    lock_timeouts: AtomicU64,
    retries: AtomicU64,
    wait_nanos: AtomicU64,
}

/// Handle to one message log file. Cheap to clone; clones share counters.
#[derive(Debug, Clone)]
pub struct MessageLog<C: Clock = SystemClock> {
    path: PathBuf,
    options: MessageLogOptions,
    clock: C,
    counters: Arc<Counters>,
}

impl MessageLog<SystemClock> {
    /// Open the log at `path`. The file may not exist yet.
    pub fn open(
        path: impl Into<PathBuf>,
        options: MessageLogOptions,
    ) -> Result<Self, MessageLogError> {
        Self::with_clock(path, options, SystemClock)
    }
}

impl<C: Clock> MessageLog<C> {
    pub fn with_clock(
        path: impl Into<PathBuf>,
        options: MessageLogOptions,
        clock: C,
    ) -> Result<Self, MessageLogError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(MessageLogError::InvalidPath { path, reason: "path is empty" });
        }
        validate_path(&path)?;
        Ok(Self { path, options, clock, counters: Arc::new(Counters::default()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &MessageLogOptions {
        &self.options
    }

    /// Append one message and return its id.
    ///
    /// Fills `msg_id` and `timestamp` when empty. `ISSUE` messages without an
    /// `issue_id` get their own id.
    pub fn append(&self, mut msg: Message) -> Result<String, MessageLogError> {
        if msg.msg_type.trim().is_empty() {
            return Err(MessageLogError::InvalidMessage("message type is empty"));
        }
        if msg.project_id.trim().is_empty() {
            return Err(MessageLogError::InvalidMessage("project id is empty"));
        }
        if msg.msg_id.is_empty() {
            msg.msg_id = generate_message_id();
        }
        if msg.timestamp.is_none() {
            msg.timestamp = Some(self.clock.utc_now());
        }
        if msg.is_type(MessageType::Issue) && msg.issue_id.is_none() {
            msg.issue_id = Some(msg.msg_id.clone());
        }
        let record = codec::encode(&msg)?;
        validate_path(&self.path)?;

        let attempts = self.options.max_retries.max(1);
        for attempt in 0..attempts {
            if attempt > 0 {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(self.options.retry_backoff * (1 << (attempt - 1).min(16)));
            }
            match self.try_append(record.as_bytes()) {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(
                            path = %self.path.display(),
                            msg_id = %msg.msg_id,
                            attempt = attempt + 1,
                            "append succeeded after lock retry"
                        );
                    }
                    return Ok(msg.msg_id);
                }
                Err(AppendAttempt::Timeout) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        msg_id = %msg.msg_id,
                        attempt = attempt + 1,
                        max_retries = attempts,
                        "message log lock timed out"
                    );
                }
                Err(AppendAttempt::Failed(e)) => {
                    tracing::error!(path = %self.path.display(), error = %e, "append failed");
                    return Err(e);
                }
            }
        }
        Err(MessageLogError::LockTimeout { path: self.path.clone(), attempts })
    }

    fn try_append(&self, record: &[u8]) -> Result<(), AppendAttempt> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| AppendAttempt::Failed(e.into()))?;

        self.counters.lock_waits.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let acquired = LockGuard::acquire(&file, self.options.lock_timeout);
        let waited = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.counters.wait_nanos.fetch_add(waited, Ordering::Relaxed);
        let guard = match acquired {
            Ok(guard) => guard,
            Err(LockError::Timeout(_)) => {
                self.counters.lock_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(AppendAttempt::Timeout);
            }
            Err(LockError::Io(e)) => return Err(AppendAttempt::Failed(e.into())),
        };

        self.write_locked(guard.file(), record).map_err(AppendAttempt::Failed)
    }

    /// Repair, write and rotate. Caller holds the lock.
    ///
    /// Only the tail of the file is read, so an append costs the same on a
    /// long log as on an empty one.
    fn write_locked(&self, file: &File, record: &[u8]) -> Result<(), MessageLogError> {
        let len = file.metadata()?.len();
        let tail = scan_tail(file, len)?;
        if tail.complete_len < len {
            tracing::warn!(
                path = %self.path.display(),
                dropped_bytes = len - tail.complete_len,
                "truncating partial trailing record"
            );
            file.set_len(tail.complete_len)?;
        }

        let mut buf = Vec::with_capacity(record.len() + 1);
        if tail.complete_len > 0 && !tail.ends_with_blank_line {
            buf.push(b'\n');
        }
        buf.extend_from_slice(record);
        let mut handle = file;
        handle.write_all(&buf)?;
        handle.flush()?;
        if self.options.fsync {
            file.sync_data()?;
        }

        if let Some(limit) = self.options.auto_rotate_bytes {
            if tail.complete_len + buf.len() as u64 >= limit {
                let mut contents = Vec::new();
                handle.seek(SeekFrom::Start(0))?;
                handle.read_to_end(&mut contents)?;
                self.rotate_locked(file, &contents)?;
            }
        }
        Ok(())
    }

    fn rotate_locked(&self, file: &File, contents: &[u8]) -> Result<(), MessageLogError> {
        let stamp = format_stamp(self.clock.utc_now());
        let base = format!("{}.{stamp}", self.path.display());
        let mut archive = PathBuf::from(format!("{base}.archived.zst"));
        let mut n = 1;
        while archive.exists() {
            archive = PathBuf::from(format!("{base}-{n}.archived.zst"));
            n += 1;
        }
        let compressed = zstd::encode_all(contents, 0)?;
        std::fs::write(&archive, compressed)?;
        file.set_len(0)?;
        if self.options.fsync {
            file.sync_all()?;
        }
        tracing::info!(
            path = %self.path.display(),
            archive = %archive.display(),
            previous_size = contents.len(),
            "message log rotated"
        );
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Message>, MessageLogError> {
        validate_path(&self.path)?;
        match std::fs::read(&self.path) {
            Ok(data) => Ok(codec::decode(&data).messages),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Messages strictly after `since_id`, or the whole log for `""`.
    pub fn read(&self, since_id: &str) -> Result<Vec<Message>, MessageLogError> {
        let messages = self.read_all()?;
        messages_after(messages, since_id.trim())
    }

    /// The last `n` messages, or all of them for `n == 0`.
    pub fn read_last(&self, n: usize) -> Result<Vec<Message>, MessageLogError> {
        let mut messages = self.read_all()?;
        if n > 0 && messages.len() > n {
            messages.drain(..messages.len() - n);
        }
        Ok(messages)
    }

    /// Like [`read`](Self::read), keeping only the newest `limit` messages.
    pub fn read_since_limited(
        &self,
        since_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, MessageLogError> {
        let mut messages = self.read(since_id)?;
        if limit > 0 && messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }

    /// Block until a message newer than `last_id` exists.
    ///
    /// Returns an empty vector once `cancel` fires. If `last_id` vanished
    /// because the file was truncated or rotated, reading restarts from the
    /// beginning of the new file.
    pub fn poll_for_new(
        &self,
        last_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, MessageLogError> {
        let mut cursor = last_id.to_string();
        loop {
            if cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            match self.read(&cursor) {
                Ok(messages) if !messages.is_empty() => return Ok(messages),
                Ok(_) => {}
                Err(MessageLogError::SinceIdNotFound(id)) => {
                    tracing::info!(
                        path = %self.path.display(),
                        since_id = %id,
                        "message log reset, rereading from start"
                    );
                    cursor.clear();
                    continue;
                }
                Err(e) => return Err(e),
            }
            std::thread::sleep(self.options.poll_interval);
        }
    }

    pub fn contention_stats(&self) -> ContentionStats {
        ContentionStats {
            lock_waits: self.counters.lock_waits.load(Ordering::Relaxed),
            lock_timeouts: self.counters.lock_timeouts.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            total_wait: Duration::from_nanos(self.counters.wait_nanos.load(Ordering::Relaxed)),
        }
    }
}

/// Where complete records end, found by reading back from the end of the
/// file in growing windows.
struct Tail {
    complete_len: u64,
    ends_with_blank_line: bool,
}

fn scan_tail(file: &File, len: u64) -> Result<Tail, MessageLogError> {
    let mut handle = file;
    let mut window_len = TAIL_WINDOW.min(len);
    loop {
        let offset = len - window_len;
        let mut window = Vec::with_capacity(window_len as usize);
        handle.seek(SeekFrom::Start(offset))?;
        std::io::Read::by_ref(&mut handle).take(window_len).read_to_end(&mut window)?;

        let at_file_start = offset == 0;
        let start = codec::last_record_start(&window, at_file_start);
        if start.is_some() || at_file_start {
            let start = start.unwrap_or(0);
            let complete = start + codec::decode(&window[start..]).complete_len as usize;
            return Ok(Tail {
                complete_len: offset + complete as u64,
                ends_with_blank_line: window[..complete].ends_with(b"\n\n"),
            });
        }
        window_len = (window_len * 2).min(len);
    }
}

enum AppendAttempt {
    Timeout,
    Failed(MessageLogError),
}

fn messages_after(
    mut messages: Vec<Message>,
    since_id: &str,
) -> Result<Vec<Message>, MessageLogError> {
    if since_id.is_empty() {
        return Ok(messages);
    }
    match messages.iter().position(|m| m.msg_id == since_id) {
        Some(idx) => Ok(messages.split_off(idx + 1)),
        None => Err(MessageLogError::SinceIdNotFound(since_id.to_string())),
    }
}

/// Reject symlinks and anything that is not a regular file. A missing file
/// is fine: it is created on first append.
fn validate_path(path: &Path) -> Result<(), MessageLogError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            Err(MessageLogError::InvalidPath { path: path.to_path_buf(), reason: "is a symlink" })
        }
        Ok(meta) if !meta.is_file() => Err(MessageLogError::InvalidPath {
            path: path.to_path_buf(),
            reason: "not a regular file",
        }),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
