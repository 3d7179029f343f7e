// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use conductor_core::RunStatus;
use tempfile::tempdir;

fn run_path(root: &Path) -> PathBuf {
    let dir = root.join("proj/task-20260101-000000-demo/runs/run-1");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("run-info.yaml")
}

#[test]
fn write_then_read_preserves_record() {
    let dir = tempdir().unwrap();
    let path = run_path(dir.path());
    let info = RunInfo::builder()
        .run_id("run-1")
        .project_id("proj")
        .task_id("task-20260101-000000-demo")
        .parent_run_id("run-0")
        .pid(42)
        .pgid(42)
        .build();

    write_run_info(&path, &info).unwrap();
    assert_eq!(read_run_info(&path).unwrap(), info);
}

#[test]
fn written_file_is_world_readable_and_leaves_no_temp() {
    let dir = tempdir().unwrap();
    let path = run_path(dir.path());
    write_run_info(&path, &RunInfo::builder().build()).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);
    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn on_disk_keys_use_wire_names() {
    let dir = tempdir().unwrap();
    let path = run_path(dir.path());
    let mut info = RunInfo::builder().agent_type("claude").build();
    info.command_line = Some("claude -p".to_string());
    write_run_info(&path, &info).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("agent: claude"), "{text}");
    assert!(text.contains("commandline: claude -p"), "{text}");
    assert!(!text.contains("end_time"), "{text}");
}

#[test]
fn read_infers_scope_from_path_and_defaults_version() {
    let dir = tempdir().unwrap();
    let path = run_path(dir.path());
    std::fs::write(&path, "pid: 7\nexit_code: 0\nend_time: 2026-01-02T03:04:05Z\n").unwrap();

    let info = read_run_info(&path).unwrap();
    assert_eq!(info.run_id, "run-1");
    assert_eq!(info.project_id, "proj");
    assert_eq!(info.task_id, "task-20260101-000000-demo");
    assert_eq!(info.version, 1);
    assert_eq!(info.status, RunStatus::Completed);
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempdir().unwrap();
    let err = read_run_info(&dir.path().join("run-info.yaml")).unwrap_err();
    assert!(matches!(err, RunStoreError::NotFound(_)));
}

#[test]
fn update_applies_change_under_lock() {
    let dir = tempdir().unwrap();
    let path = run_path(dir.path());
    write_run_info(&path, &RunInfo::builder().build()).unwrap();
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

    let updated = update_run_info(&path, |info| {
        info.finish(143, at);
    })
    .unwrap();

    assert_eq!(updated.status, RunStatus::Failed);
    assert_eq!(updated.end_time, Some(at));
    assert_eq!(updated.error_summary.as_deref(), Some("agent terminated (SIGTERM)"));
    assert_eq!(read_run_info(&path).unwrap(), updated);
}

#[test]
fn concurrent_updates_do_not_lose_writes() {
    let dir = tempdir().unwrap();
    let path = run_path(dir.path());
    write_run_info(&path, &RunInfo::builder().pid(0).build()).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let path = path.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    update_run_info(&path, |info| info.pid += 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(read_run_info(&path).unwrap().pid, 80);
}

#[test]
fn update_times_out_while_sidecar_is_held() {
    let dir = tempdir().unwrap();
    let path = run_path(dir.path());
    write_run_info(&path, &RunInfo::builder().build()).unwrap();

    let holder = File::create(sidecar_lock_path(&path)).unwrap();
    crate::message_log::lock_exclusive(&holder, Duration::ZERO).unwrap();

    let err = update_run_info(&path, |_| {}).unwrap_err();
    assert!(matches!(err, RunStoreError::LockTimeout(_)), "{err}");
}
