// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router fixture for handler tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, BodyDataStream};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use conductor_adapters::{AgentRegistry, CommandAgent};
use conductor_core::paths;
use futures_util::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use super::{router, AppState};
use crate::config::{Config, StreamSettings};
use crate::supervisor::{TaskKey, TaskSupervisor};

pub const TASK: &str = "task-20260101-000000-api";

/// A daemon rooted in a temp dir with one shell agent, `sh`.
pub struct TestApp {
    pub dir: TempDir,
    pub state: AppState,
    app: Router,
}

impl TestApp {
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut agents = AgentRegistry::new();
        agents.register(Arc::new(CommandAgent::shell("sh", script)));
        let stream = StreamSettings {
            poll_interval: Duration::from_millis(20),
            discovery_interval: Duration::from_millis(20),
            heartbeat_interval: Duration::from_secs(30),
            max_clients_per_run: 2,
        };
        let config = Config::for_root(dir.path())
            .agents(agents)
            .stream(stream)
            .wait_timeout(Duration::from_secs(5));
        let config = Arc::new(config);
        let shutdown = CancellationToken::new();
        let supervisor = TaskSupervisor::new(Arc::clone(&config), shutdown.clone());
        let state = AppState::new(config, supervisor, shutdown);
        let app = router(state.clone());
        Self { dir, state, app }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn task_dir(&self, project_id: &str, task_id: &str) -> PathBuf {
        paths::task_dir(self.root(), project_id, task_id)
    }

    pub async fn response(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.response(req).await;
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body =
            if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().method(Method::DELETE).uri(uri).body(Body::empty()).unwrap();
        self.send(req).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    /// Open an SSE endpoint, optionally resuming from `last_event_id`.
    pub async fn open_stream(&self, uri: &str, last_event_id: Option<&str>) -> Response {
        let mut req = Request::builder().uri(uri);
        if let Some(id) = last_event_id {
            req = req.header("last-event-id", id);
        }
        self.response(req.body(Body::empty()).unwrap()).await
    }

    /// Wait for background supervision of a task to end.
    pub async fn wait_idle(&self, project_id: &str, task_id: &str) {
        let key = TaskKey::new(project_id, task_id);
        for _ in 0..250 {
            if !self.state.supervisor.is_running(&key) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task {project_id}/{task_id} still supervised");
    }

    pub fn error_code(body: &Value) -> &str {
        body["error"]["code"].as_str().unwrap_or_default()
    }
}

/// Next SSE frame of a streaming body.
pub async fn next_frame(body: &mut BodyDataStream) -> String {
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("timed out waiting for an SSE frame")
        .expect("stream ended")
        .unwrap();
    String::from_utf8(chunk.to_vec()).unwrap()
}
