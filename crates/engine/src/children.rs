// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness of run records.
//!
//! A record that claims to be `running` is only believed while its process
//! group exists. Records whose group is gone are rewritten as `failed` the
//! moment anyone looks at them.

use crate::{blocking, SupervisorError};
use conductor_adapters::{is_group_alive, terminate_process_group, ProcessError};
use conductor_core::{RunInfo, RunStatus};
use conductor_storage::{scan_task_runs, update_run_info};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const DEAD_GROUP_SUMMARY: &str = "process group not alive";

/// Group to check for a record; falls back to the pid for old records.
fn record_pgid(info: &RunInfo) -> i32 {
    if info.pgid > 0 {
        info.pgid
    } else {
        info.pid
    }
}

/// Records still being set up by this process carry our own pid.
fn is_record_alive(info: &RunInfo) -> bool {
    let own = std::process::id() as i32;
    if info.pid == own {
        return true;
    }
    let pgid = record_pgid(info);
    pgid > 0 && is_group_alive(pgid)
}

/// Running records of a task, with dead ones persisted as `failed`.
///
/// Returns the records that are still alive.
fn sweep(task_dir: &Path, children_only: bool) -> Result<Vec<RunInfo>, SupervisorError> {
    let mut alive = Vec::new();
    for (path, info) in scan_task_runs(task_dir)? {
        if info.status != RunStatus::Running || (children_only && !info.is_child()) {
            continue;
        }
        if is_record_alive(&info) {
            alive.push(info);
            continue;
        }
        mark_dead(&path, &info)?;
    }
    Ok(alive)
}

fn mark_dead(path: &Path, info: &RunInfo) -> Result<(), SupervisorError> {
    let now = chrono::Utc::now();
    let updated = update_run_info(path, |record| {
        // The owner may have finished it since the scan.
        if record.status == RunStatus::Running {
            record.fail(None, now, DEAD_GROUP_SUMMARY);
        }
    })?;
    if updated.error_summary.as_deref() == Some(DEAD_GROUP_SUMMARY) {
        tracing::warn!(
            run_id = %info.run_id,
            task_id = %info.task_id,
            pgid = record_pgid(info),
            "run marked failed: process group not alive"
        );
    }
    Ok(())
}

/// Live child runs of the task at `task_dir`.
///
/// Only `running` records with a parent are considered. Any whose process
/// group has vanished is rewritten as `failed` and left out.
pub fn find_active_children(task_dir: &Path) -> Result<Vec<RunInfo>, SupervisorError> {
    sweep(task_dir, true)
}

/// Apply the liveness rule to every `running` record of the task, root runs
/// included. Returns the ids of runs that are still alive.
///
/// Only safe when nothing in this process supervises the task's runs.
pub fn reconcile_task(task_dir: &Path) -> Result<Vec<String>, SupervisorError> {
    Ok(sweep(task_dir, false)?.into_iter().map(|info| info.run_id).collect())
}

/// SIGTERM every live run of the task. Returns how many groups were signalled.
///
/// Records are left alone; each run's supervisor writes its own outcome.
pub fn stop_task(task_dir: &Path) -> Result<usize, SupervisorError> {
    let own = std::process::id() as i32;
    let mut stopped = 0;
    for (_, info) in scan_task_runs(task_dir)? {
        if info.status != RunStatus::Running || info.pid == own || !is_record_alive(&info) {
            continue;
        }
        match terminate_process_group(record_pgid(&info)) {
            Ok(()) => {
                tracing::info!(run_id = %info.run_id, pgid = record_pgid(&info), "stopping run");
                stopped += 1;
            }
            Err(ProcessError::GroupNotFound(_)) => {}
            Err(e) => return Err(SupervisorError::Agent(e.into())),
        }
    }
    Ok(stopped)
}

/// Wait until the task has no live child runs.
///
/// Children that appear while waiting are waited for too. Gives up with
/// [`SupervisorError::WaitTimeout`] after `timeout`.
pub async fn wait_for_children(
    task_dir: &Path,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), SupervisorError> {
    let deadline = Instant::now() + timeout;
    loop {
        let dir = task_dir.to_path_buf();
        let active = blocking(move || find_active_children(&dir)).await?;
        if active.is_empty() {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(SupervisorError::WaitTimeout {
                pending: active.into_iter().map(|info| info.run_id).collect(),
            });
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(SupervisorError::Cancelled),
            _ = tokio::time::sleep(poll_interval.min(deadline.saturating_duration_since(now))) => {}
        }
    }
}

#[cfg(test)]
#[path = "children_tests.rs"]
mod tests;
