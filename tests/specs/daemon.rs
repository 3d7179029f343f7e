// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle specs
//!
//! Verify crash recovery at startup and a task's path through the HTTP API.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::Utc;
use conductor_adapters::{AgentRegistry, CommandAgent};
use conductor_core::{paths, RunInfo, RunStatus};
use conductor_daemon::lifecycle::{startup, StartupResult};
use conductor_daemon::{api, Config, LifecycleError};
use conductor_storage::write_run_info;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::prelude::*;

const TASK: &str = "task-20260101-000000-daemon";

fn config(root: &Path, script: &str) -> Config {
    let mut agents = AgentRegistry::new();
    agents.register(Arc::new(CommandAgent::shell("sh", script)));
    Config::for_root(root).agents(agents).wait_timeout(Duration::from_secs(5))
}

async fn call(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value =
        if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

/// Leave a `running` record behind, as a daemon killed mid-run would.
fn crashed_run(root: &Path) -> String {
    let run_id = "20260101-0000000000-1-1".to_string();
    let run_dir = paths::run_dir(&paths::task_dir(root, "proj", TASK), &run_id);
    std::fs::create_dir_all(&run_dir).unwrap();
    let mut info = RunInfo::started(&run_id, "proj", TASK, "sh", Utc::now());
    info.pid = 2_000_000_000;
    info.pgid = 2_000_000_000;
    write_run_info(&paths::run_info_path(&run_dir), &info).unwrap();
    run_id
}

#[tokio::test]
async fn daemon_fails_orphaned_runs_on_startup() {
    let dir = tempdir().unwrap();
    let run_id = crashed_run(dir.path());

    let StartupResult { daemon, .. } = startup(config(dir.path(), "true")).await.unwrap();
    let app = api::router(daemon.app_state());

    let (status, run) = call(&app, Method::GET, &format!("/api/v1/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "failed");
    assert!(run["end_time"].is_string());

    daemon.shutdown().await;
}

#[tokio::test]
async fn only_one_daemon_per_root() {
    let dir = tempdir().unwrap();
    let first = startup(config(dir.path(), "true")).await.unwrap();

    match startup(config(dir.path(), "true")).await {
        Err(LifecycleError::LockFailed(_)) => {}
        Err(e) => panic!("expected LockFailed, got: {e}"),
        Ok(_) => panic!("second daemon started on the same root"),
    }
    first.daemon.shutdown().await;
}

#[tokio::test]
async fn task_runs_to_completion_through_the_api() {
    let dir = tempdir().unwrap();
    let script = "echo working; touch \"$CONDUCTOR_TASK_FOLDER/DONE\"";
    let StartupResult { daemon, .. } = startup(config(dir.path(), script)).await.unwrap();
    let app = api::router(daemon.app_state());

    let create =
        json!({ "project_id": "proj", "task_id": TASK, "agent_type": "sh", "prompt": "go" });
    let (status, created) = call(&app, Method::POST, "/api/v1/tasks", Some(create)).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");

    let detail_uri = format!("/api/v1/tasks/{TASK}?project_id=proj");
    let deadline = Instant::now() + Duration::from_millis(SPEC_WAIT_MAX_MS);
    let detail = loop {
        let (_, detail) = call(&app, Method::GET, &detail_uri, None).await;
        if detail["status"] == "completed" && detail["supervised"] == false {
            break detail;
        }
        assert!(Instant::now() < deadline, "task never completed: {detail}");
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    assert_eq!(detail["done"], true);
    let runs = detail["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["status"], RunStatus::Completed.to_string());

    let bus_uri = format!("/api/v1/messages?project_id=proj&task_id={TASK}");
    let (_, bus) = call(&app, Method::GET, &bus_uri, None).await;
    let types: Vec<&str> =
        bus["messages"].as_array().unwrap().iter().filter_map(|m| m["type"].as_str()).collect();
    assert!(types.contains(&"RUN_START"), "{types:?}");
    assert!(types.contains(&"RUN_STOP"), "{types:?}");

    daemon.shutdown().await;
}
