// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::Command;
use clap::Parser;
use conductor_core::{paths, RunStatus};
use conductor_storage::read_run_info;
use serial_test::serial;
use tempfile::tempdir;

const TASK: &str = "task-20260101-000000-job";

fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("conductord").chain(args.iter().copied()))
}

fn job_args(cli: &Cli) -> JobArgs {
    match &cli.command {
        Some(Command::Job(args)) => args.clone(),
        None => panic!("no job subcommand in {cli:?}"),
    }
}

#[test]
#[serial]
fn job_flags_resolve_to_engine_options() {
    let dir = tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let cli = parse(&[
        "--root",
        root,
        "--agent",
        "nap=sleep,0",
        "job",
        "--project",
        "proj",
        "--task",
        TASK,
        "--agent-type",
        "nap",
        "--prompt",
        "rest",
        "--parent-run-id",
        "20260101-0000000000-1-1",
    ])
    .unwrap();

    let args = job_args(&cli);
    assert_eq!(args.project_id, "proj");
    assert_eq!(args.task_id, TASK);

    let opts = args.options(&cli).unwrap();
    assert_eq!(opts.root_dir, dir.path());
    assert_eq!(opts.agent_type, "nap");
    assert_eq!(opts.prompt, "rest");
    assert_eq!(opts.parent_run_id.as_deref(), Some("20260101-0000000000-1-1"));
    assert_eq!(opts.previous_run_id, None);
    assert!(opts.agents.get("nap").is_ok());
}

#[test]
#[serial]
fn prompt_file_is_read() {
    let dir = tempdir().unwrap();
    let prompt = dir.path().join("prompt.md");
    std::fs::write(&prompt, "from a file\n").unwrap();
    let cli = parse(&[
        "--root",
        dir.path().to_str().unwrap(),
        "job",
        "--project",
        "proj",
        "--task",
        TASK,
        "--agent-type",
        "claude",
        "--prompt-file",
        prompt.to_str().unwrap(),
    ])
    .unwrap();

    let opts = job_args(&cli).options(&cli).unwrap();
    assert_eq!(opts.prompt, "from a file\n");
    assert_eq!(opts.parent_run_id, None);
}

#[yare::parameterized(
    no_prompt = { &[] },
    both_prompts = { &["--prompt", "a", "--prompt-file", "b"] },
)]
#[serial]
fn prompt_flags_are_validated(extra: &[&str]) {
    let mut args = vec!["job", "--project", "p", "--task", TASK, "--agent-type", "claude"];
    args.extend_from_slice(extra);
    assert!(parse(&args).is_err());
}

#[test]
#[serial]
fn agent_environment_makes_the_job_a_child_run() {
    let dir = tempdir().unwrap();
    let vars = [
        ("CONDUCTOR_RUNS_DIR", dir.path().to_str().unwrap()),
        ("CONDUCTOR_PROJECT_ID", "proj"),
        ("CONDUCTOR_TASK_ID", TASK),
        ("CONDUCTOR_RUN_ID", "20260101-0000000000-7-0"),
    ];
    for (key, value) in vars {
        std::env::set_var(key, value);
    }
    let parsed = parse(&["job", "--agent-type", "claude", "--prompt", "help"]);
    for (key, _) in vars {
        std::env::remove_var(key);
    }

    let cli = parsed.unwrap();
    let args = job_args(&cli);
    assert_eq!(args.project_id, "proj");
    assert_eq!(args.task_id, TASK);
    let opts = args.options(&cli).unwrap();
    assert_eq!(opts.root_dir, dir.path());
    assert_eq!(opts.parent_run_id.as_deref(), Some("20260101-0000000000-7-0"));
}

#[tokio::test]
#[serial]
async fn job_records_its_parent_and_exit_code() {
    let dir = tempdir().unwrap();
    let cli = parse(&[
        "--root",
        dir.path().to_str().unwrap(),
        "--agent",
        "sh=sh,-c,exit 3",
        "job",
        "--project",
        "proj",
        "--task",
        TASK,
        "--agent-type",
        "sh",
        "--prompt",
        "fail on purpose",
        "--parent-run-id",
        "20260101-0000000000-1-1",
    ])
    .unwrap();

    let outcome = run(&cli, &job_args(&cli)).await.unwrap();
    assert_eq!(outcome.exit_code, 3);
    assert_eq!(outcome.status, RunStatus::Failed);

    let info = read_run_info(&paths::run_info_path(&outcome.run_dir)).unwrap();
    assert_eq!(info.parent_run_id, "20260101-0000000000-1-1");
    assert!(info.is_child());
    assert_eq!(info.exit_code, 3);
}

#[yare::parameterized(
    success = { 0, 0 },
    failure = { 3, 3 },
    sigterm = { 143, 143 },
    pending = { -1, 1 },
    too_large = { 300, 1 },
)]
fn exit_status_fits_a_process_code(code: i32, expected: u8) {
    assert_eq!(exit_status(code), expected);
}
