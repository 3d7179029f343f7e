// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conductor daemon library
//!
//! Supervises agent runs per task and serves their records, message buses
//! and live output over HTTP.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod api;
pub mod config;
pub mod env;
pub mod job;
pub mod lifecycle;
pub mod logging;
pub mod stream;
pub mod supervisor;

pub use config::{Cli, Command, Config};
pub use lifecycle::{DaemonState, LifecycleError, StartupResult};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the daemon until SIGINT or SIGTERM, then shut down gracefully.
pub async fn run(config: Config) -> Result<(), LifecycleError> {
    let StartupResult { daemon, listener } = lifecycle::startup(config).await?;
    spawn_signal_handler(daemon.shutdown.clone())?;

    let router = api::router(daemon.app_state());
    let token = daemon.shutdown.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await;

    daemon.shutdown().await;
    served?;
    Ok(())
}

pub(crate) fn spawn_signal_handler(shutdown: CancellationToken) -> Result<(), LifecycleError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C; shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM; shutting down"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
    Ok(())
}
