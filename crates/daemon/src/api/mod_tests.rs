// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::test_helpers::TestApp;
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn health_is_ok() {
    let app = TestApp::new("true");
    assert_eq!(app.get("/api/v1/health").await, (StatusCode::OK, json!({ "status": "ok" })));
}

#[tokio::test]
async fn version_reports_the_crate_version() {
    let app = TestApp::new("true");
    let (status, body) = app.get("/api/v1/version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn status_counts_running_records_and_lists_agents() {
    let app = TestApp::new("true");
    app.state.store.create_run("proj", super::test_helpers::TASK, "sh").unwrap();

    let (status, body) = app.get("/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_runs_count"], 1);
    assert_eq!(body["configured_agents"], json!(["sh"]));
    assert_eq!(body["running_tasks"], json!([]));
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new("true");
    let (status, _) = app.get("/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test]
fn errors_carry_code_and_message() {
    use super::ApiError;
    use axum::response::IntoResponse;

    let resp = ApiError::TooManyRequests("too many clients".into()).into_response();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let err = ApiError::from(conductor_storage::MessageLogError::SinceIdNotFound("MSG-x".into()));
    assert_eq!(err.code(), "NOT_FOUND");
    let err = ApiError::from(crate::stream::StreamError::MaxClients { run_id: "r".into(), max: 1 });
    assert_eq!(err.code(), "TOO_MANY_REQUESTS");
}
