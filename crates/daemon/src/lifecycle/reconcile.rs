// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation of run records left behind by a previous daemon.

use std::path::Path;

use conductor_core::RunStatus;
use conductor_engine::reconcile_task;
use conductor_storage::{scan_task_runs, task_dirs};
use tracing::{info, warn};

use super::LifecycleError;

/// What a reconciliation pass found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Task directories visited.
    pub tasks: usize,
    /// `running` records whose process group was gone, now `failed`.
    pub orphaned: usize,
    /// `running` records whose process group still exists.
    pub alive: usize,
}

/// Fail every `running` record under `root` whose process group is gone.
///
/// Must run before anything in this process starts supervising tasks. A task
/// whose records cannot be read is logged and skipped.
pub fn reconcile_all(root: &Path) -> Result<ReconcileSummary, LifecycleError> {
    let mut summary = ReconcileSummary::default();
    for task_dir in task_dirs(root)? {
        summary.tasks += 1;
        let running = match scan_task_runs(&task_dir) {
            Ok(runs) => runs.iter().filter(|(_, info)| info.status == RunStatus::Running).count(),
            Err(e) => {
                warn!(task_dir = %task_dir.display(), error = %e, "skipping unreadable task");
                continue;
            }
        };
        if running == 0 {
            continue;
        }
        match reconcile_task(&task_dir) {
            Ok(alive) => {
                summary.alive += alive.len();
                summary.orphaned += running.saturating_sub(alive.len());
                if !alive.is_empty() {
                    info!(
                        task_dir = %task_dir.display(),
                        runs = %alive.join(", "),
                        "runs from a previous daemon are still alive"
                    );
                }
            }
            Err(e) => {
                warn!(task_dir = %task_dir.display(), error = %e, "failed to reconcile task");
            }
        }
    }
    info!(
        tasks = summary.tasks,
        orphaned = summary.orphaned,
        alive = summary.alive,
        "reconciled run records"
    );
    Ok(summary)
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
