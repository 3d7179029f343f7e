// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use conductor_adapters::{terminate_process_group, ProcessError};
use conductor_core::RunInfo;
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::json;

use super::{blocking, sse, ApiError, AppState};
use crate::stream::Cursor;

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    pub project_id: Option<String>,
    pub task_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = Arc::clone(&state.store);
    let runs = blocking(move || {
        let runs = match (query.project_id.as_deref(), query.task_id.as_deref()) {
            (Some(project_id), Some(task_id)) => store.list_runs(project_id, task_id)?,
            (project_id, task_id) => store
                .all_runs()?
                .into_iter()
                .filter(|run| project_id.is_none_or(|p| run.project_id == p))
                .filter(|run| task_id.is_none_or(|t| run.task_id == t))
                .collect(),
        };
        Ok(runs)
    })
    .await?;
    Ok(Json(json!({ "runs": runs })))
}

pub async fn detail(
    State(state): State<AppState>,
    UrlPath(run_id): UrlPath<String>,
) -> Result<Json<RunInfo>, ApiError> {
    let store = Arc::clone(&state.store);
    let info = blocking(move || Ok(store.get_run_info(&run_id)?)).await?;
    Ok(Json(info))
}

/// The run-info file as stored.
pub async fn info(
    State(state): State<AppState>,
    UrlPath(run_id): UrlPath<String>,
) -> Result<Response, ApiError> {
    let store = Arc::clone(&state.store);
    let bytes = blocking(move || {
        let path = store.run_info_path(&run_id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ApiError::NotFound(format!("not found: {run_id}")))
            }
            Err(e) => Err(e.into()),
        }
    })
    .await?;
    Ok(([(header::CONTENT_TYPE, "application/x-yaml")], bytes).into_response())
}

pub async fn stop(
    State(state): State<AppState>,
    UrlPath(run_id): UrlPath<String>,
) -> Result<Response, ApiError> {
    let store = Arc::clone(&state.store);
    let info = blocking(move || Ok(store.get_run_info(&run_id)?)).await?;
    if info.status.is_terminal() {
        return Err(ApiError::Conflict(format!("run {} already {}", info.run_id, info.status)));
    }

    let pgid = if info.pgid > 0 { info.pgid } else { info.pid };
    if pgid <= 0 || info.pid == std::process::id() as i32 {
        return Err(ApiError::Conflict(format!("run {} has no process yet", info.run_id)));
    }
    match terminate_process_group(pgid) {
        Ok(()) => {}
        Err(ProcessError::GroupNotFound(_)) => {
            return Err(ApiError::Conflict(format!("run {} is not running", info.run_id)));
        }
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    }
    tracing::info!(run_id = %info.run_id, pgid, "run stop requested");
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "stopping" }))).into_response())
}

/// Live output and status of one run.
///
/// `Last-Event-ID` carries the cursor of the last log line the client got;
/// lines up to it are not sent again.
pub async fn stream(
    State(state): State<AppState>,
    UrlPath(run_id): UrlPath<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let since = sse::last_event_id(&headers).map(|id| Cursor::parse(&id)).unwrap_or_default();
    let subscription = state.streams.subscribe_run(&run_id, since)?;
    tracing::debug!(run_id = %run_id, cursor = %since, "run stream opened");
    let heartbeat = state.config.stream.heartbeat_interval;
    Ok(sse::respond(subscription.into_stream(), heartbeat, state.shutdown.clone()))
}

/// Every run under the root, including runs started after connecting.
pub async fn stream_all(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let heartbeat = state.config.stream.heartbeat_interval;
    sse::respond(state.streams.subscribe_all(), heartbeat, state.shutdown.clone())
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
