// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier generation for messages and runs.
//!
//! Both id kinds start with a UTC timestamp so that lexical order follows
//! creation order, then carry the process id and a per-process counter so
//! that independent processes writing in the same instant do not collide.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a new message id for the current process.
///
/// Format: `MSG-YYYYMMDD-HHMMSS-<nanos:9>-PID<pid:5>-<seq:4>`
pub fn generate_message_id() -> String {
    message_id_at(Utc::now(), std::process::id())
}

/// Generate a message id for an explicit instant and pid.
pub fn message_id_at(at: DateTime<Utc>, pid: u32) -> String {
    let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed) % 10_000;
    format!(
        "MSG-{}-{:09}-PID{:05}-{:04}",
        at.format("%Y%m%d-%H%M%S"),
        at.timestamp_subsec_nanos(),
        pid % 100_000,
        seq
    )
}

/// Generate a run id for the current process.
///
/// Format: `YYYYMMDD-HHMMSSffff-<pid>-<seq>` where `ffff` is ten-thousandths
/// of a second.
pub fn generate_run_id() -> String {
    run_id_at(Utc::now(), std::process::id())
}

/// Generate a run id for an explicit instant and pid.
pub fn run_id_at(at: DateTime<Utc>, pid: u32) -> String {
    let seq = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}{:04}-{}-{}",
        at.format("%Y%m%d-%H%M%S"),
        at.timestamp_subsec_nanos() / 100_000,
        pid,
        seq
    )
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
