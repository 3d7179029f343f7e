// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live stream multiplexer.
//!
//! Run output files are tailed once per run, however many clients watch
//! it, and fanned out over a broadcast channel. Slow clients lag and lose
//! events; they never hold up the tailers.

pub mod cursor;
mod discovery;
mod manager;
mod messages;
mod run_stream;
pub mod tailer;

pub use cursor::Cursor;
pub use discovery::Discovery;
pub use manager::{StreamManager, Subscription};
pub use messages::message_stream;
pub use tailer::{LogLine, TailFrom, Tailer};

use conductor_core::{Message, RunStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which output file of a run a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

conductor_core::simple_display! {
    LogStream {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("run not found: {0}")]
    RunNotFound(String),
    #[error("run {run_id} already has {max} stream clients")]
    MaxClients { run_id: String, max: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogPayload {
    pub run_id: String,
    pub project_id: String,
    pub task_id: String,
    pub stream: LogStream,
    pub line: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub run_id: String,
    pub project_id: String,
    pub task_id: String,
    pub status: RunStatus,
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DonePayload {
    pub run_id: String,
    pub status: RunStatus,
    pub exit_code: i32,
}

/// Everything a stream client can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Log { cursor: Cursor, payload: LogPayload },
    Status(StatusPayload),
    Message(Box<Message>),
    Heartbeat,
    /// Terminal status seen; the per-run stream ends after this.
    Done(DonePayload),
    /// The source failed; the connection stays open.
    Error { run_id: Option<String>, error: String },
}

impl StreamEvent {
    /// SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Log { .. } => "log",
            StreamEvent::Status(_) => "status",
            StreamEvent::Message(_) => "message",
            StreamEvent::Heartbeat => "heartbeat",
            StreamEvent::Done(_) => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// SSE `id:`, only set where a client can resume from it.
    pub fn id(&self) -> Option<String> {
        match self {
            StreamEvent::Log { cursor, .. } => Some(cursor.to_string()),
            StreamEvent::Message(msg) => Some(msg.msg_id.clone()),
            _ => None,
        }
    }

    /// SSE `data:` payload.
    pub fn data(&self) -> serde_json::Value {
        let value = match self {
            StreamEvent::Log { payload, .. } => serde_json::to_value(payload),
            StreamEvent::Status(payload) => serde_json::to_value(payload),
            StreamEvent::Message(msg) => serde_json::to_value(msg),
            StreamEvent::Heartbeat => Ok(serde_json::json!({})),
            StreamEvent::Done(payload) => serde_json::to_value(payload),
            StreamEvent::Error { run_id: Some(run_id), error } => {
                Ok(serde_json::json!({ "run_id": run_id, "error": error }))
            }
            StreamEvent::Error { run_id: None, error } => Ok(serde_json::json!({ "error": error })),
        };
        value.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done(_))
    }

    /// Whether a reconnecting client holding `seen` already has this event.
    pub fn seen_by(&self, seen: &Cursor) -> bool {
        match self {
            StreamEvent::Log { cursor, payload } => {
                cursor.get(payload.stream) <= seen.get(payload.stream)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
