// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::convert::Infallible;
use std::path::PathBuf;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use conductor_core::{paths, validate_project_id, validate_task_id, Message, MessageType, Parent};
use conductor_storage::MessageLog;
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::json;

use super::{blocking, sse, ApiError, AppState};
use crate::stream::message_stream;

#[derive(Debug, Deserialize)]
pub struct BusQuery {
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    /// Only messages appended after this id.
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessage {
    pub project_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default, rename = "type")]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    pub body: String,
}

/// Task bus when a task is named, project bus otherwise.
fn bus_path(
    state: &AppState,
    project_id: &str,
    task_id: Option<&str>,
) -> Result<PathBuf, ApiError> {
    validate_project_id(project_id)?;
    match task_id.filter(|t| !t.is_empty()) {
        Some(task_id) => {
            validate_task_id(task_id)?;
            let task_dir = paths::task_dir(&state.config.root_dir, project_id, task_id);
            Ok(paths::task_bus_path(&task_dir))
        }
        None => Ok(paths::project_bus_path(&state.config.root_dir, project_id)),
    }
}

fn open_bus(state: &AppState, query: &BusQuery) -> Result<MessageLog, ApiError> {
    let project_id = query
        .project_id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("project_id is required".to_string()))?;
    let path = bus_path(state, project_id, query.task_id.as_deref())?;
    Ok(MessageLog::open(path, state.config.log_options.clone())?)
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<BusQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let log = open_bus(&state, &query)?;
    let after = query.after.unwrap_or_default();
    let messages = blocking(move || Ok(log.read(&after)?)).await?;
    Ok(Json(json!({ "messages": messages })))
}

pub async fn post(
    State(state): State<AppState>,
    body: Result<Json<PostMessage>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if req.body.trim().is_empty() {
        return Err(ApiError::BadRequest("body is required".to_string()));
    }
    let path = bus_path(&state, &req.project_id, req.task_id.as_deref())?;
    let log = MessageLog::open(path, state.config.log_options.clone())?;

    let msg_type = req
        .msg_type
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| MessageType::User.to_string());
    let timestamp = Utc::now();
    let mut msg = Message::new(msg_type, &req.project_id, req.body)
        .task_id(req.task_id.unwrap_or_default())
        .run_id(req.run_id.unwrap_or_default())
        .parents(req.parents.into_iter().map(Parent::new).collect());
    msg.timestamp = Some(timestamp);

    let task_bus = !msg.task_id.is_empty();
    let msg_id = blocking(move || {
        if let Some(dir) = log.path().parent() {
            if task_bus && !dir.is_dir() {
                return Err(ApiError::NotFound(format!("task not found: {}", msg.task_id)));
            }
            std::fs::create_dir_all(dir)?;
        }
        Ok(log.append(msg)?)
    })
    .await?;
    tracing::debug!(msg_id = %msg_id, project_id = %req.project_id, "message posted");

    let body = json!({ "msg_id": msg_id, "timestamp": timestamp });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Live feed of a bus. `Last-Event-ID` is the last `msg_id` the client got.
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<BusQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let log = open_bus(&state, &query)?;
    let last_id = sse::last_event_id(&headers).or(query.after).unwrap_or_default();
    let events = message_stream(log, last_id, state.config.stream.poll_interval);
    Ok(sse::respond(events, state.config.stream.heartbeat_interval, state.shutdown.clone()))
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
