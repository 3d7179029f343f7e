// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn at(secs: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, secs).unwrap()
}

#[test]
fn started_run_is_active_with_pending_exit_code() {
    let info = RunInfo::started("r1", "proj", "task", "claude", at(0));
    assert!(info.is_active());
    assert_eq!(info.status, RunStatus::Running);
    assert_eq!(info.exit_code, EXIT_CODE_PENDING);
    assert_eq!(info.version, RUN_INFO_VERSION);
}

#[yare::parameterized(
    clean = { 0, RunStatus::Completed, None },
    failure = { 1, RunStatus::Failed, Some("agent reported failure") },
    usage = { 2, RunStatus::Failed, Some("agent usage error") },
    killed = { 137, RunStatus::Failed, Some("agent killed (OOM or signal)") },
    sigterm = { 143, RunStatus::Failed, Some("agent terminated (SIGTERM)") },
    other = { 42, RunStatus::Failed, Some("agent exited with code 42") },
)]
fn finish_classifies_exit_code(code: i32, status: RunStatus, summary: Option<&str>) {
    let mut info = RunInfo::started("r1", "proj", "task", "claude", at(0));
    info.finish(code, at(5));
    assert_eq!(info.status, status);
    assert_eq!(info.exit_code, code);
    assert_eq!(info.end_time, Some(at(5)));
    assert_eq!(info.error_summary.as_deref(), summary);
}

#[test]
fn end_time_tracks_running_state() {
    let mut info = RunInfo::builder().build();
    info.set_status(RunStatus::Failed, 3, at(1));
    assert!(info.end_time.is_some());
    info.set_status(RunStatus::Running, EXIT_CODE_PENDING, at(2));
    assert!(info.end_time.is_none());
}

#[test]
fn fail_without_an_exit_leaves_the_code_pending() {
    let mut info = RunInfo::builder().build();
    assert!(info.fail(None, at(3), "process group not alive"));
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.exit_code, EXIT_CODE_PENDING);
    assert_eq!(info.end_time, Some(at(3)));
    assert_eq!(info.error_summary.as_deref(), Some("process group not alive"));

    let mut legacy = RunInfo::builder().exit_code(0).build();
    legacy.fail(None, at(3), "process group not alive");
    assert_eq!(legacy.exit_code, EXIT_CODE_PENDING);
}

#[yare::parameterized(
    clean_exit = { 0 },
    sigterm = { 143 },
    custom = { 9 },
)]
fn cancelled_run_keeps_its_real_exit_code(code: i32) {
    let mut info = RunInfo::builder().build();
    info.fail(Some(code), at(3), "cancelled");
    assert_eq!(info.status, RunStatus::Failed);
    assert_eq!(info.exit_code, code);
    assert_eq!(info.error_summary.as_deref(), Some("cancelled"));
}

#[test]
fn ended_runs_are_never_rewritten() {
    let mut failed = RunInfo::builder().build();
    failed.fail(None, at(3), "process group not alive");
    assert!(!failed.finish(0, at(4)));
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.end_time, Some(at(3)));
    assert_eq!(failed.error_summary.as_deref(), Some("process group not alive"));

    let mut completed = RunInfo::builder().build();
    completed.finish(0, at(3));
    assert!(!completed.fail(Some(1), at(4), "cancelled"));
    assert_eq!(completed.status, RunStatus::Completed);
    assert_eq!(completed.exit_code, 0);
}

#[test]
fn yaml_uses_compatible_field_names() {
    let mut info = RunInfo::builder().parent_run_id("root").build();
    info.command_line = Some("claude -p".to_string());
    let yaml = serde_yaml::to_string(&info).unwrap();
    assert!(yaml.contains("agent: command"), "{yaml}");
    assert!(yaml.contains("commandline: claude -p"), "{yaml}");
    assert!(yaml.contains("parent_run_id: root"), "{yaml}");
    assert!(yaml.contains("status: running"), "{yaml}");
    assert!(!yaml.contains("end_time"), "{yaml}");
    assert!(!yaml.contains("previous_run_id"), "{yaml}");
}

#[yare::parameterized(
    active = { None, 0, RunStatus::Running },
    ended_clean = { Some(at(9)), 0, RunStatus::Completed },
    ended_failed = { Some(at(9)), 1, RunStatus::Failed },
)]
fn hydrate_status_infers_missing_status(
    end: Option<DateTime<Utc>>,
    code: i32,
    expected: RunStatus,
) {
    let mut info = RunInfo::builder()
        .status(RunStatus::Unknown)
        .end_time(end)
        .exit_code(code)
        .build();
    info.hydrate_status();
    assert_eq!(info.status, expected);
}
