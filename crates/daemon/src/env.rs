// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use conductor_storage::MessageLogOptions;

use crate::lifecycle::LifecycleError;

/// Daemon version reported by `/version` and `/status`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn millis(name: &str) -> Option<Duration> {
    var(name).and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|s| s.parse::<T>().ok())
}

/// Resolve the storage root: CONDUCTOR_ROOT > XDG_STATE_HOME/conductor/runs
/// > ~/.local/state/conductor/runs
pub fn root_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(dir) = var("CONDUCTOR_ROOT") {
        return Ok(PathBuf::from(dir));
    }
    Ok(state_dir()?.join("runs"))
}

fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(xdg) = var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("conductor"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/conductor"))
}

/// Directory for `conductord.log`; defaults to the storage root.
pub fn log_dir() -> Option<PathBuf> {
    var("CONDUCTOR_LOG_DIR").map(PathBuf::from)
}

/// Message Log tunables (`CONDUCTOR_BUS_*`) layered over the defaults.
pub fn message_log_options() -> MessageLogOptions {
    let defaults = MessageLogOptions::default();
    MessageLogOptions {
        lock_timeout: millis("CONDUCTOR_BUS_LOCK_TIMEOUT_MS").unwrap_or(defaults.lock_timeout),
        poll_interval: millis("CONDUCTOR_BUS_POLL_MS").unwrap_or(defaults.poll_interval),
        max_retries: parsed("CONDUCTOR_BUS_MAX_RETRIES").unwrap_or(defaults.max_retries),
        retry_backoff: defaults.retry_backoff,
        fsync: var("CONDUCTOR_BUS_FSYNC")
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(defaults.fsync),
        auto_rotate_bytes: parsed::<u64>("CONDUCTOR_BUS_ROTATE_BYTES")
            .filter(|n| *n > 0)
            .or(defaults.auto_rotate_bytes),
    }
}

/// Tail and run-info poll interval for live streams (default 500ms).
pub fn stream_poll_interval() -> Duration {
    millis("CONDUCTOR_STREAM_POLL_MS").unwrap_or(Duration::from_millis(500))
}

/// New-run discovery interval for the all-runs stream (default 1s).
pub fn discovery_interval() -> Duration {
    millis("CONDUCTOR_DISCOVERY_MS").unwrap_or(Duration::from_secs(1))
}

/// SSE heartbeat interval (default 30s).
pub fn heartbeat_interval() -> Duration {
    millis("CONDUCTOR_HEARTBEAT_MS").unwrap_or(Duration::from_secs(30))
}

/// Subscribers allowed per run stream (default 10).
pub fn max_clients_per_run() -> usize {
    parsed::<usize>("CONDUCTOR_MAX_CLIENTS").filter(|n| *n > 0).unwrap_or(10)
}

/// How long a finished task waits for its child runs (default 300s).
pub fn wait_timeout() -> Duration {
    millis("CONDUCTOR_WAIT_TIMEOUT_MS").unwrap_or(Duration::from_secs(300))
}

/// Root-run restarts before a task is abandoned (default 100).
pub fn max_restarts() -> u32 {
    parsed("CONDUCTOR_MAX_RESTARTS").unwrap_or(100)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
