// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: exclusive startup, crash recovery, graceful shutdown.

mod reconcile;
mod startup;
pub use reconcile::{reconcile_all, ReconcileSummary};
pub use startup::{startup, StartupResult};

use std::fs::File;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conductor_engine::SupervisorError;
use conductor_storage::RunStoreError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::AppState;
use crate::config::Config;
use crate::supervisor::TaskSupervisor;

/// How long shutdown waits for supervised tasks to wind down.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// A running daemon.
///
/// The listener is returned separately from startup so the caller decides
/// when to start serving.
pub struct DaemonState {
    pub config: Arc<Config>,
    // NOTE(lifetime): holds the root lock until dropped
    #[allow(dead_code)]
    lock_file: File,
    pub supervisor: Arc<TaskSupervisor>,
    /// Cancelled once to stop serving, end streams and cancel supervision.
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

impl DaemonState {
    /// Shared state for the HTTP router.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.config),
            Arc::clone(&self.supervisor),
            self.shutdown.clone(),
        )
    }

    /// Stop supervision and release the root.
    ///
    /// Supervised tasks are cancelled, which terminates their runs. Runs
    /// that outlive the grace period are failed by reconciliation on the
    /// next startup.
    pub async fn shutdown(self) {
        info!("daemon shutting down");
        self.shutdown.cancel();
        if !self.supervisor.drain(SHUTDOWN_GRACE).await {
            warn!(grace = ?SHUTDOWN_GRACE, "supervised tasks did not stop in time");
        }

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!(error = %e, "failed to remove pid file");
            }
        }

        info!(uptime = ?self.start_time.elapsed(), "daemon stopped");
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no home directory to place the storage root under")]
    NoStateDir,

    #[error("storage root is locked by another daemon")]
    LockFailed(#[source] std::io::Error),

    #[error("cannot bind {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot set up logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Storage(#[from] RunStoreError),

    #[error(transparent)]
    Job(#[from] SupervisorError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
