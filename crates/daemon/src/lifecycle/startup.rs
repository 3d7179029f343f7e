// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bringing the daemon up: lock, reconcile, bind.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{reconcile_all, DaemonState, LifecycleError};
use crate::config::Config;
use crate::supervisor::TaskSupervisor;

/// A started daemon and the listener it has not begun serving on yet.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: TcpListener,
}

/// Acquire the root, fail orphaned runs and bind the API listener.
pub async fn startup(config: Config) -> Result<StartupResult, LifecycleError> {
    let lock_path = config.lock_path.clone();
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // A held lock means the PID file is the running daemon's.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(&lock_path);
            }
            Err(e)
        }
    }
}

async fn startup_inner(mut config: Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.root_dir)?;
    if let Some(parent) = config.lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Opened without truncation: until the lock is ours the pid belongs to
    // whichever daemon holds it.
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // Nothing is supervised yet, so every live `running` record is foreign.
    let root = config.root_dir.clone();
    tokio::task::spawn_blocking(move || reconcile_all(&root))
        .await
        .map_err(|e| LifecycleError::Io(std::io::Error::other(e)))??;

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen_addr, e))?;
    // Port 0 resolves here; agents are told the real address.
    config.listen_addr = listener.local_addr()?;

    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    let supervisor = TaskSupervisor::new(Arc::clone(&config), shutdown.clone());

    info!(
        addr = %config.listen_addr,
        root = %config.root_dir.display(),
        agents = %config.agents.agent_types().join(", "),
        "daemon started"
    );

    Ok(StartupResult {
        daemon: DaemonState {
            config,
            lock_file,
            supervisor,
            shutdown,
            start_time: Instant::now(),
        },
        listener,
    })
}

/// Remove the pid file left by a startup that failed after locking.
fn cleanup_on_failure(lock_path: &Path) {
    if lock_path.exists() {
        if let Err(e) = std::fs::remove_file(lock_path) {
            warn!(path = %lock_path.display(), error = %e, "failed to remove pid file");
        }
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
