// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use conductor_core::RunStatus;
use serde::Serialize;

use super::{blocking, ApiError, AppState};
use crate::env::VERSION;
use crate::supervisor::RunningTask;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Version {
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DaemonStatus {
    pub active_runs_count: usize,
    pub uptime_seconds: u64,
    pub configured_agents: Vec<String>,
    pub version: &'static str,
    pub running_tasks: Vec<RunningTask>,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub async fn version() -> Json<Version> {
    Json(Version { version: VERSION })
}

pub async fn status(State(state): State<AppState>) -> Result<Json<DaemonStatus>, ApiError> {
    let store = Arc::clone(&state.store);
    let active_runs_count = blocking(move || {
        let runs = store.all_runs()?;
        Ok(runs.iter().filter(|run| run.status == RunStatus::Running).count())
    })
    .await?;

    Ok(Json(DaemonStatus {
        active_runs_count,
        uptime_seconds: state.started.elapsed().as_secs(),
        configured_agents: state.config.agents.agent_types(),
        version: VERSION,
        running_tasks: state.supervisor.running(),
    }))
}
