// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::api::test_helpers::{TestApp, TASK};
use conductor_core::RunStatus;
use conductor_storage::update_run_info;
use serde_json::Value;
use std::os::unix::process::CommandExt;
use yare::parameterized;

const FINISH: &str = "touch \"$CONDUCTOR_TASK_FOLDER/DONE\"";

fn create_body(prompt: &str) -> Value {
    json!({ "project_id": "proj", "task_id": TASK, "agent_type": "sh", "prompt": prompt })
}

fn finished_run(app: &TestApp) -> RunInfo {
    let run = app.state.store.create_run("proj", TASK, "sh").unwrap();
    app.state.store.update_run_status(&run.run_id, RunStatus::Completed, 0).unwrap()
}

#[tokio::test]
async fn create_starts_supervision_and_writes_the_prompt() {
    let app = TestApp::new(FINISH);
    let (status, body) = app.post("/api/v1/tasks", create_body("build it")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "project_id": "proj", "task_id": TASK, "status": "started" }));

    let task_dir = app.task_dir("proj", TASK);
    let prompt = std::fs::read_to_string(task_dir.join(paths::TASK_PROMPT_FILE)).unwrap();
    assert_eq!(prompt, "build it\n");

    app.wait_idle("proj", TASK).await;
    let (status, body) = app.get("/api/v1/tasks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tasks"][0]["task_id"], TASK);
    assert_eq!(body["tasks"][0]["status"], "completed");
    assert!(body["tasks"][0]["last_activity"].is_string());
}

#[tokio::test]
async fn missing_task_id_is_generated_from_the_prompt() {
    let app = TestApp::new(FINISH);
    let body = json!({ "project_id": "proj", "agent_type": "sh", "prompt": "Fix the login bug" });
    let (status, body) = app.post("/api/v1/tasks", body).await;
    assert_eq!(status, StatusCode::CREATED);

    let task_id = body["task_id"].as_str().unwrap().to_string();
    assert!(task_id.ends_with("-fix-the-login-bug"), "{task_id}");
    validate_task_id(&task_id).unwrap();
    app.wait_idle("proj", &task_id).await;
}

#[parameterized(
    bad_attach_mode = { "attach_mode", json!("join") },
    unknown_agent = { "agent_type", json!("nope") },
    bad_project = { "project_id", json!("Bad Project") },
    bad_task_id = { "task_id", json!("task-1") },
    empty_prompt = { "prompt", json!("") },
    bad_config_key = { "config", json!({ "A=B": "1" }) },
    null_agent = { "agent_type", Value::Null },
)]
#[test_macro(tokio::test)]
async fn invalid_create_requests_are_rejected(field: &str, value: Value) {
    let app = TestApp::new(FINISH);
    let mut body = create_body("x");
    body[field] = value;
    let (status, body) = app.post("/api/v1/tasks", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(TestApp::error_code(&body), "BAD_REQUEST");
}

#[tokio::test]
async fn supervised_task_conflicts_on_create_and_attaches_on_attach() {
    let app = TestApp::new("sleep 5");
    let (status, _) = app.post("/api/v1/tasks", create_body("wait")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.post("/api/v1/tasks", create_body("wait")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(TestApp::error_code(&body), "CONFLICT");

    let mut attach = create_body("");
    attach["attach_mode"] = json!("attach");
    let (status, body) = app.post("/api/v1/tasks", attach).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "attached");

    app.state.supervisor.shutdown();
    app.wait_idle("proj", TASK).await;
}

#[tokio::test]
async fn config_map_reaches_the_agent_environment() {
    let script = format!("echo \"$GREETING\" > \"$CONDUCTOR_TASK_FOLDER/out.txt\"; {FINISH}");
    let app = TestApp::new(&script);
    let mut body = create_body("greet");
    body["config"] = json!({ "GREETING": "hello" });
    let (status, _) = app.post("/api/v1/tasks", body).await;
    assert_eq!(status, StatusCode::CREATED);

    app.wait_idle("proj", TASK).await;
    let out = std::fs::read_to_string(app.task_dir("proj", TASK).join("out.txt")).unwrap();
    assert_eq!(out, "hello\n");
}

#[tokio::test]
async fn detail_lists_runs_and_resolves_the_project() {
    let app = TestApp::new(FINISH);
    let run = app.state.store.create_run("proj", TASK, "sh").unwrap();

    let (status, body) = app.get(&format!("/api/v1/tasks/{TASK}?project_id=proj")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["done"], false);
    assert_eq!(body["supervised"], false);
    assert_eq!(body["runs"][0]["run_id"], run.run_id.as_str());

    let (status, body) = app.get(&format!("/api/v1/tasks/{TASK}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_id"], "proj");
}

#[tokio::test]
async fn detail_errors() {
    let app = TestApp::new(FINISH);
    let (status, _) = app.get(&format!("/api/v1/tasks/{TASK}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/api/v1/tasks/not-a-task").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    std::fs::create_dir_all(app.task_dir("proj", TASK)).unwrap();
    std::fs::create_dir_all(app.task_dir("other", TASK)).unwrap();
    let (status, body) = app.get(&format!("/api/v1/tasks/{TASK}")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"].as_str().unwrap().contains("other, proj"));

    let (status, _) = app.get(&format!("/api/v1/tasks/{TASK}?project_id=other")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn stop_marks_done_and_terminates_live_groups() {
    let app = TestApp::new(FINISH);
    let run = app.state.store.create_run("proj", TASK, "sh").unwrap();
    let mut child =
        std::process::Command::new("sleep").arg("30").process_group(0).spawn().unwrap();
    let path = app.state.store.run_info_path(&run.run_id).unwrap();
    update_run_info(&path, |info| {
        info.pid = child.id() as i32;
        info.pgid = child.id() as i32;
    })
    .unwrap();

    let uri = format!("/api/v1/tasks/{TASK}/stop?project_id=proj");
    let (status, body) = app.post(&uri, json!({})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["stopped_runs"], 1);
    assert!(paths::done_path(&app.task_dir("proj", TASK)).is_file());

    let exit = child.wait().unwrap();
    assert!(!exit.success());
}

#[tokio::test]
async fn delete_removes_idle_tasks_only() {
    let app = TestApp::new(FINISH);
    let live = app.state.store.create_run("proj", TASK, "sh").unwrap();

    let (status, body) = app.delete(&format!("/api/v1/tasks/{TASK}?project_id=proj")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"].as_str().unwrap().contains(&live.run_id));

    app.state.store.update_run_status(&live.run_id, RunStatus::Failed, 1).unwrap();
    let (status, body) = app.delete(&format!("/api/v1/tasks/{TASK}?project_id=proj")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    assert!(!app.task_dir("proj", TASK).exists());
}

#[tokio::test]
async fn resume_clears_done_and_starts_again() {
    let app = TestApp::new(FINISH);
    finished_run(&app);
    let task_dir = app.task_dir("proj", TASK);
    std::fs::write(task_dir.join(paths::TASK_PROMPT_FILE), "keep going\n").unwrap();
    std::fs::write(paths::done_path(&task_dir), b"").unwrap();

    let (status, body) = app.post(&format!("/api/v1/tasks/{TASK}/resume"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["resumed"], true);

    app.wait_idle("proj", TASK).await;
    let runs = app.state.store.list_runs("proj", TASK).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|run| run.status.is_terminal()));
}

#[tokio::test]
async fn resume_refuses_live_tasks_and_unknown_agents() {
    let app = TestApp::new(FINISH);
    let live = app.state.store.create_run("proj", TASK, "sh").unwrap();
    std::fs::write(app.task_dir("proj", TASK).join(paths::TASK_PROMPT_FILE), "x\n").unwrap();

    let (status, _) = app.post(&format!("/api/v1/tasks/{TASK}/resume"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.state.store.update_run_status(&live.run_id, RunStatus::Completed, 0).unwrap();
    let body = json!({ "agent_type": "nope" });
    let (status, _) = app.post(&format!("/api/v1/tasks/{TASK}/resume"), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
