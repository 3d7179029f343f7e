// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP API, mounted under `/api/v1`.

mod error;
mod messages;
mod runs;
mod service;
pub mod sse;
mod tasks;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use conductor_storage::RunStore;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::stream::StreamManager;
use crate::supervisor::TaskSupervisor;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<RunStore>,
    pub streams: Arc<StreamManager>,
    pub supervisor: Arc<TaskSupervisor>,
    /// Cancelled when the daemon stops; ends every open event stream.
    pub shutdown: CancellationToken,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        supervisor: Arc<TaskSupervisor>,
        shutdown: CancellationToken,
    ) -> Self {
        let store = Arc::new(RunStore::new(&config.root_dir));
        let streams = StreamManager::new(Arc::clone(&store), config.stream);
        Self { config, store, streams, supervisor, shutdown, started: Instant::now() }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(service::health))
        .route("/version", get(service::version))
        .route("/status", get(service::status))
        .route("/tasks", get(tasks::list).post(tasks::create))
        .route("/tasks/{task_id}", get(tasks::detail).delete(tasks::remove))
        .route("/tasks/{task_id}/resume", post(tasks::resume))
        .route("/tasks/{task_id}/stop", post(tasks::stop))
        .route("/runs", get(runs::list))
        .route("/runs/stream/all", get(runs::stream_all))
        .route("/runs/{run_id}", get(runs::detail))
        .route("/runs/{run_id}/info", get(runs::info))
        .route("/runs/{run_id}/stop", post(runs::stop))
        .route("/runs/{run_id}/stream", get(runs::stream))
        .route("/messages", get(messages::list).post(messages::post))
        .route("/messages/stream", get(messages::stream));

    Router::new().nest("/api/v1", api).layer(TraceLayer::new_for_http()).with_state(state)
}

/// Run blocking file IO off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| ApiError::Internal(e.to_string()))?
}

#[cfg(test)]
mod test_helpers;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
