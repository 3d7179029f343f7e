// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use conductor_core::{
    generate_task_id, paths, validate_project_id, validate_task_id, RunInfo, TaskStatus,
};
use conductor_engine::{reconcile_task, stop_task};
use conductor_storage::{scan_task_runs, task_dirs};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{blocking, ApiError, AppState};
use crate::supervisor::{StartRequest, TaskKey};

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub project_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub project_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    pub done: bool,
    pub supervised: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub runs: Vec<RunInfo>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTask {
    pub project_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub agent_type: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    /// Extra environment for the task's agents.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub attach_mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResumeTask {
    #[serde(default)]
    pub agent_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachMode {
    /// Start a new supervision; refuse if one is live.
    Create,
    /// Join a live supervision, or start one.
    Attach,
    /// Clear the done marker and continue from the latest run.
    Resume,
}

impl AttachMode {
    fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw.map(str::trim).unwrap_or_default() {
            "" | "create" => Ok(AttachMode::Create),
            "attach" => Ok(AttachMode::Attach),
            "resume" => Ok(AttachMode::Resume),
            other => Err(ApiError::BadRequest(format!(
                "invalid attach_mode {other:?}: must be create, attach, or resume"
            ))),
        }
    }
}

fn last_activity(runs: &[RunInfo]) -> Option<DateTime<Utc>> {
    runs.iter().map(|run| run.end_time.unwrap_or(run.start_time)).max()
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Directory of `task_id`, searching every project when none is given.
fn locate_task(
    root: &Path,
    task_id: &str,
    project_id: Option<&str>,
) -> Result<(String, PathBuf), ApiError> {
    validate_task_id(task_id)?;
    let not_found = || ApiError::NotFound(format!("task not found: {task_id}"));

    if let Some(project_id) = project_id.filter(|p| !p.is_empty()) {
        validate_project_id(project_id)?;
        let dir = paths::task_dir(root, project_id, task_id);
        return if dir.is_dir() { Ok((project_id.to_string(), dir)) } else { Err(not_found()) };
    }

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };
    let mut found = Vec::new();
    for entry in entries {
        let project = entry?.path();
        let dir = project.join(task_id);
        if dir.is_dir() {
            found.push((file_name(&project), dir));
        }
    }
    match found.len() {
        0 => Err(not_found()),
        1 => Ok(found.remove(0)),
        _ => {
            let mut projects: Vec<String> = found.into_iter().map(|(p, _)| p).collect();
            projects.sort();
            Err(ApiError::Conflict(format!(
                "task {task_id} exists in several projects ({}); pass project_id",
                projects.join(", ")
            )))
        }
    }
}

fn remove_done(task_dir: &Path) -> Result<(), ApiError> {
    match std::fs::remove_file(paths::done_path(task_dir)) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn read_task_prompt(task_dir: &Path) -> Result<Option<String>, ApiError> {
    match std::fs::read_to_string(task_dir.join(paths::TASK_PROMPT_FILE)) {
        Ok(prompt) if !prompt.trim().is_empty() => Ok(Some(prompt)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Create the task layout and settle on the prompt to run with.
///
/// An existing `TASK.md` is never overwritten. Without a prompt in the
/// request, the existing one is reused.
fn prepare_task_dir(task_dir: &Path, prompt: &str, mode: AttachMode) -> Result<String, ApiError> {
    std::fs::create_dir_all(paths::runs_dir(task_dir))?;
    if mode == AttachMode::Resume {
        remove_done(task_dir)?;
    }
    let existing = read_task_prompt(task_dir)?;
    if prompt.trim().is_empty() {
        return existing.ok_or_else(|| ApiError::BadRequest("prompt is required".to_string()));
    }
    let mut prompt = prompt.to_string();
    if !prompt.ends_with('\n') {
        prompt.push('\n');
    }
    if existing.is_none() {
        std::fs::write(task_dir.join(paths::TASK_PROMPT_FILE), &prompt)?;
    }
    Ok(prompt)
}

fn environment(config: BTreeMap<String, String>) -> Result<Vec<(String, String)>, ApiError> {
    config
        .into_iter()
        .map(|(key, value)| {
            if key.is_empty() || key.contains(['=', '\0']) {
                Err(ApiError::BadRequest(format!("invalid config key {key:?}")))
            } else {
                Ok((key, value))
            }
        })
        .collect()
}

pub async fn list(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let root = state.config.root_dir.clone();
    let tasks = blocking(move || {
        let mut tasks = Vec::new();
        for dir in task_dirs(&root)? {
            let runs: Vec<RunInfo> = scan_task_runs(&dir)?.into_iter().map(|(_, r)| r).collect();
            let done = paths::done_path(&dir).exists();
            tasks.push(TaskSummary {
                project_id: dir.parent().map(file_name).unwrap_or_default(),
                task_id: file_name(&dir),
                status: TaskStatus::derive(&runs, done),
                last_activity: last_activity(&runs),
            });
        }
        Ok(tasks)
    })
    .await?;
    Ok(Json(json!({ "tasks": tasks })))
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreateTask>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mode = AttachMode::parse(req.attach_mode.as_deref())?;
    validate_project_id(&req.project_id)?;
    let task_id = match req.task_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => {
            validate_task_id(&id)?;
            id
        }
        None => generate_task_id(Utc::now(), req.prompt.lines().next()),
    };
    let key = TaskKey::new(&req.project_id, &task_id);

    if state.supervisor.is_running(&key) {
        if mode == AttachMode::Attach {
            let body = json!({
                "project_id": key.project_id,
                "task_id": key.task_id,
                "status": "attached",
            });
            return Ok((StatusCode::OK, Json(body)).into_response());
        }
        return Err(ApiError::Conflict(format!(
            "task {}/{} is already running",
            key.project_id, key.task_id
        )));
    }
    if !state.config.agents.contains(&req.agent_type) {
        return Err(ApiError::BadRequest(format!("unknown agent_type {:?}", req.agent_type)));
    }
    if let Some(root) = &req.project_root {
        if !root.is_dir() {
            return Err(ApiError::BadRequest(format!(
                "project_root {} is not a directory",
                root.display()
            )));
        }
    }
    let environment = environment(req.config)?;

    let task_dir = paths::task_dir(&state.config.root_dir, &key.project_id, &key.task_id);
    let prompt = req.prompt;
    let prompt = blocking(move || prepare_task_dir(&task_dir, &prompt, mode)).await?;

    state.supervisor.start(StartRequest {
        key: key.clone(),
        agent_type: req.agent_type.clone(),
        prompt,
        working_dir: req.project_root,
        environment,
        resume: mode == AttachMode::Resume,
    })?;
    tracing::info!(
        project_id = %key.project_id,
        task_id = %key.task_id,
        agent_type = %req.agent_type,
        attach_mode = ?mode,
        "task create accepted"
    );

    let body = json!({ "project_id": key.project_id, "task_id": key.task_id, "status": "started" });
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub async fn detail(
    State(state): State<AppState>,
    UrlPath(task_id): UrlPath<String>,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<TaskDetail>, ApiError> {
    let root = state.config.root_dir.clone();
    let id = task_id.clone();
    let (project_id, runs, done) = blocking(move || {
        let (project_id, dir) = locate_task(&root, &id, query.project_id.as_deref())?;
        let runs: Vec<RunInfo> = scan_task_runs(&dir)?.into_iter().map(|(_, r)| r).collect();
        Ok((project_id, runs, paths::done_path(&dir).exists()))
    })
    .await?;

    let supervised = state.supervisor.is_running(&TaskKey::new(&project_id, &task_id));
    Ok(Json(TaskDetail {
        status: TaskStatus::derive(&runs, done),
        last_activity: last_activity(&runs),
        project_id,
        task_id,
        done,
        supervised,
        runs,
    }))
}

/// Live runs block resume and delete.
fn ensure_idle(state: &AppState, key: &TaskKey, task_dir: &Path) -> Result<(), ApiError> {
    if state.supervisor.is_running(key) {
        return Err(ApiError::Conflict(format!(
            "task {}/{} is being supervised",
            key.project_id, key.task_id
        )));
    }
    let live = reconcile_task(task_dir)?;
    if !live.is_empty() {
        return Err(ApiError::Conflict(format!("task has live runs: {}", live.join(", "))));
    }
    Ok(())
}

pub async fn resume(
    State(state): State<AppState>,
    UrlPath(task_id): UrlPath<String>,
    Query(query): Query<ProjectQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: ResumeTask = if body.iter().all(u8::is_ascii_whitespace) {
        ResumeTask::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let root = state.config.root_dir.clone();
    let (key, prompt, latest_agent) = {
        let state = state.clone();
        blocking(move || {
            let (project_id, dir) = locate_task(&root, &task_id, query.project_id.as_deref())?;
            let key = TaskKey::new(project_id, task_id);
            ensure_idle(&state, &key, &dir)?;
            let prompt = read_task_prompt(&dir)?
                .ok_or_else(|| ApiError::BadRequest("task has no prompt to resume".to_string()))?;
            let latest_agent = scan_task_runs(&dir)?
                .into_iter()
                .map(|(_, run)| run)
                .filter(|run| !run.is_child() && !run.agent_type.is_empty())
                .next_back()
                .map(|run| run.agent_type);
            remove_done(&dir)?;
            Ok((key, prompt, latest_agent))
        })
        .await?
    };

    let agent_type = req
        .agent_type
        .or(latest_agent)
        .ok_or_else(|| ApiError::BadRequest("agent_type is required".to_string()))?;
    if !state.config.agents.contains(&agent_type) {
        return Err(ApiError::BadRequest(format!("unknown agent_type {agent_type:?}")));
    }

    state.supervisor.start(StartRequest {
        key: key.clone(),
        agent_type,
        prompt,
        working_dir: None,
        environment: Vec::new(),
        resume: true,
    })?;
    tracing::info!(project_id = %key.project_id, task_id = %key.task_id, "task resumed");

    let body = json!({
        "project_id": key.project_id,
        "task_id": key.task_id,
        "resumed": true,
        "status": "started",
    });
    Ok((StatusCode::OK, Json(body)).into_response())
}

pub async fn stop(
    State(state): State<AppState>,
    UrlPath(task_id): UrlPath<String>,
    Query(query): Query<ProjectQuery>,
) -> Result<Response, ApiError> {
    let root = state.config.root_dir.clone();
    let (project_id, task_id, stopped) = blocking(move || {
        let (project_id, dir) = locate_task(&root, &task_id, query.project_id.as_deref())?;
        std::fs::write(paths::done_path(&dir), b"")?;
        let stopped = stop_task(&dir)?;
        Ok((project_id, task_id, stopped))
    })
    .await?;
    tracing::info!(project_id = %project_id, task_id = %task_id, stopped, "task stop requested");

    let body = json!({ "project_id": project_id, "task_id": task_id, "stopped_runs": stopped });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

pub async fn remove(
    State(state): State<AppState>,
    UrlPath(task_id): UrlPath<String>,
    Query(query): Query<ProjectQuery>,
) -> Result<StatusCode, ApiError> {
    let root = state.config.root_dir.clone();
    let key = {
        let state = state.clone();
        blocking(move || {
            let (project_id, dir) = locate_task(&root, &task_id, query.project_id.as_deref())?;
            let key = TaskKey::new(project_id, task_id);
            ensure_idle(&state, &key, &dir)?;
            std::fs::remove_dir_all(&dir)?;
            Ok(key)
        })
        .await?
    };
    tracing::info!(project_id = %key.project_id, task_id = %key.task_id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
