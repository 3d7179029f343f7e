// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-engine: the process supervisor.
//!
//! [`run_job`] supervises one agent process from spawn to exit. [`run_task`]
//! is the task-level loop: it restarts the root agent until the task is
//! marked done, then waits for every child run the agents started along
//! the way.

mod bus;
pub mod children;
mod error;
pub mod job;
pub mod output;
pub mod task;

pub use bus::TaskBus;
pub use children::{find_active_children, reconcile_task, stop_task, wait_for_children};
pub use error::SupervisorError;
pub use job::{run_job, JobOptions, JobOutcome};
pub use task::{run_task, TaskOptions, RESTART_PREFIX};

/// Run blocking storage IO off the async runtime.
pub(crate) async fn blocking<T, E, F>(f: F) -> Result<T, SupervisorError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<SupervisorError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SupervisorError::Io(std::io::Error::other(e)))?
        .map_err(Into::into)
}
