// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervisor specs
//!
//! Verify that a finished task still waits for the child runs its agents
//! started.

use std::sync::Arc;

use clap::Parser;
use conductor_adapters::{AgentRegistry, CommandAgent};
use conductor_core::{paths, RunStatus};
use conductor_daemon::{job, Cli, Command};
use conductor_engine::{run_task, TaskOptions};
use conductor_storage::scan_task_runs;

use crate::prelude::*;

const PROJECT: &str = "proj";
const TASK: &str = "task-20260101-000000-parent";

/// Root agent that starts a one-second child job in the background, waits
/// until the child's record exists, prints "parent done" and marks the task
/// done.
const PARENT_WITH_CHILD: &str = r#"
"$SPEC_EXE" supervisor::child_job_helper --exact --ignored --test-threads=1 >/dev/null 2>&1 &
i=0
while [ "$(ls "$CONDUCTOR_TASK_FOLDER"/runs/*/run-info.yaml 2>/dev/null | wc -l)" -lt 2 ]; do
  i=$((i + 1))
  [ "$i" -gt 200 ] && exit 7
  sleep 0.05
done
echo "parent done"
touch "$CONDUCTOR_TASK_FOLDER/DONE"
"#;

/// `conductord job` as an agent would call it: task, root and parent run
/// all come from the agent's environment.
#[tokio::test]
#[ignore = "spawned by parent_done_waits_for_sleeping_child"]
async fn child_job_helper() {
    if helper_args().is_none() {
        return;
    }
    let cli = Cli::try_parse_from([
        "conductord",
        "--agent",
        "nap=sleep,1",
        "job",
        "--agent-type",
        "nap",
        "--prompt",
        "nap",
    ])
    .unwrap();
    let Some(Command::Job(args)) = &cli.command else {
        panic!("no job subcommand");
    };
    job::run(&cli, args).await.unwrap();
}

fn options(root: &Path) -> TaskOptions {
    let mut agents = AgentRegistry::new();
    agents.register(Arc::new(CommandAgent::shell("sh", PARENT_WITH_CHILD)));
    let exe = std::env::current_exe().unwrap().display().to_string();
    TaskOptions::new(root, "sh", "spawn a helper and finish")
        .agents(agents)
        .environment(vec![
            ("SPEC_EXE".to_string(), exe),
            (HELPER_ARGS.to_string(), "role=child".to_string()),
        ])
        .poll_interval(Duration::from_millis(50))
        .restart_delay(Duration::from_millis(10))
        .wait_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn parent_done_waits_for_sleeping_child() {
    let dir = tempdir().unwrap();
    let start = Instant::now();
    run_task(PROJECT, TASK, options(dir.path())).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(800), "returned before the child: {elapsed:?}");

    let task_dir = paths::task_dir(dir.path(), PROJECT, TASK);
    let bus = paths::task_bus_path(&task_dir);
    let stops = || {
        let text = std::fs::read_to_string(&bus).unwrap_or_default();
        text.lines().filter(|line| *line == "type: RUN_STOP").count()
    };
    assert!(wait_for(SPEC_WAIT_MAX_MS, || stops() == 2), "child job never reported");

    let runs: Vec<_> = scan_task_runs(&task_dir).unwrap().into_iter().map(|(_, i)| i).collect();
    assert_eq!(runs.len(), 2);
    let root = runs.iter().find(|r| !r.is_child()).unwrap();
    let child = runs.iter().find(|r| r.is_child()).unwrap();

    assert_eq!(root.status, RunStatus::Completed);
    assert_eq!(child.parent_run_id, root.run_id);
    assert_eq!(child.agent_type, "nap");
    assert!(child.status.is_terminal());
    let stdout = paths::run_dir(&task_dir, &root.run_id).join(paths::STDOUT_FILE);
    assert_eq!(std::fs::read_to_string(stdout).unwrap(), "parent done\n");
}

#[tokio::test]
async fn done_task_without_children_returns_promptly() {
    let dir = tempdir().unwrap();
    let mut agents = AgentRegistry::new();
    agents.register(Arc::new(CommandAgent::shell(
        "sh",
        "echo \"parent done\"; touch \"$CONDUCTOR_TASK_FOLDER/DONE\"",
    )));
    let opts = TaskOptions::new(dir.path(), "sh", "finish").agents(agents);

    let start = Instant::now();
    run_task(PROJECT, TASK, opts).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(5), "{:?}", start.elapsed());
    assert!(paths::done_path(&paths::task_dir(dir.path(), PROJECT, TASK)).is_file());
}
