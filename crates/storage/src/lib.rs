// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-storage: durable message logs and run records

pub mod message_log;
pub mod run_store;

pub use message_log::{
    lock_exclusive, unlock, ContentionStats, LockError, LockGuard, MessageLog, MessageLogError,
    MessageLogOptions,
};
pub use run_store::{
    read_run_info, scan_task_runs, task_dirs, update_run_info, write_run_info, RunStore,
    RunStoreError,
};
