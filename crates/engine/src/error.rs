// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use conductor_adapters::AgentError;
use conductor_storage::{MessageLogError, RunStoreError};
use thiserror::Error;

/// Errors from supervising jobs and tasks
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("run store: {0}")]
    Storage(#[from] RunStoreError),
    #[error("message log: {0}")]
    Log(#[from] MessageLogError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("timed out waiting for child runs: {}", pending.join(", "))]
    WaitTimeout { pending: Vec<String> },
    #[error("max restarts ({0}) exceeded")]
    MaxRestartsExceeded(u32),
    #[error("cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
