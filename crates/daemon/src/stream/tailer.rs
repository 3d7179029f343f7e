// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poll-based file tailer.
//!
//! A tailer remembers its byte offset and any unterminated trailing bytes,
//! so only complete lines are ever published. A file that shrinks below the
//! offset was truncated or replaced and is read again from the start.
//!
//! Lines are handed to the run's worker without loss; the worker never
//! waits on clients, so neither does the tailer.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::LogStream;

/// One complete line read from a run's output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub run_id: String,
    pub stream: LogStream,
    pub line: String,
    pub timestamp: DateTime<Utc>,
}

/// Where a new tailer starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailFrom {
    Start,
    /// After the last complete line present now.
    End,
    /// A byte offset from an earlier [`line_boundary`] call.
    Offset(u64),
}

#[derive(Debug)]
pub struct Tailer {
    path: PathBuf,
    run_id: String,
    stream: LogStream,
    offset: u64,
    pending: Vec<u8>,
    tx: mpsc::Sender<LogLine>,
}

impl Tailer {
    pub fn new(
        path: impl Into<PathBuf>,
        run_id: impl Into<String>,
        stream: LogStream,
        from: TailFrom,
        tx: mpsc::Sender<LogLine>,
    ) -> io::Result<Self> {
        let path = path.into();
        let offset = match from {
            TailFrom::Start => 0,
            TailFrom::End => line_boundary(&path)?.1,
            TailFrom::Offset(offset) => offset,
        };
        Ok(Self { path, run_id: run_id.into(), stream, offset, pending: Vec::new(), tx })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read whatever was appended since the last poll and return the
    /// complete lines.
    pub fn poll(&mut self) -> io::Result<Vec<LogLine>> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        if len < self.offset {
            tracing::debug!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "file shrank, tailing from start"
            );
            self.offset = 0;
            self.pending.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        self.offset += buf.len() as u64;

        let timestamp = Utc::now();
        let mut lines = Vec::new();
        let mut rest = buf.as_slice();
        while let Some(newline) = rest.iter().position(|b| *b == b'\n') {
            let mut line = std::mem::take(&mut self.pending);
            line.extend_from_slice(&rest[..newline]);
            rest = &rest[newline + 1..];
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(LogLine {
                run_id: self.run_id.clone(),
                stream: self.stream,
                line: String::from_utf8_lossy(&line).into_owned(),
                timestamp,
            });
        }
        self.pending.extend_from_slice(rest);
        Ok(lines)
    }

    /// Poll every `interval` until `cancel` fires or the receiver is gone.
    pub fn spawn(mut self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if self.tx.is_closed() {
                    break;
                }
                let lines = match self.poll() {
                    Ok(lines) => lines,
                    Err(e) => {
                        tracing::warn!(path = %self.path.display(), error = %e, "tail poll failed");
                        continue;
                    }
                };
                for line in lines {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = self.tx.send(line) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        })
    }
}

/// Complete lines in `path` and the byte offset just past the last one.
///
/// A missing file has no lines.
pub fn line_boundary(path: &Path) -> io::Result<(u64, u64)> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(e),
    };
    let mut lines = 0u64;
    let mut offset = 0u64;
    let mut read = 0u64;
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        for (i, b) in chunk[..n].iter().enumerate() {
            if *b == b'\n' {
                lines += 1;
                offset = read + i as u64 + 1;
            }
        }
        read += n as u64;
    }
    Ok((lines, offset))
}

#[cfg(test)]
#[path = "tailer_tests.rs"]
mod tests;
