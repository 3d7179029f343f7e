// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted layout under the storage root.
//!
//! ```text
//! root/<project>/PROJECT-MESSAGE-BUS.md
//! root/<project>/<task>/{TASK.md, DONE, TASK-MESSAGE-BUS.md}
//! root/<project>/<task>/runs/<run_id>/{run-info.yaml, prompt.md,
//!     agent-stdout.txt, agent-stderr.txt, output.md}
//! ```

use std::path::{Path, PathBuf};

pub const TASK_PROMPT_FILE: &str = "TASK.md";
pub const DONE_FILE: &str = "DONE";
pub const TASK_BUS_FILE: &str = "TASK-MESSAGE-BUS.md";
pub const PROJECT_BUS_FILE: &str = "PROJECT-MESSAGE-BUS.md";
pub const RUNS_DIR: &str = "runs";
pub const RUN_INFO_FILE: &str = "run-info.yaml";
pub const PROMPT_FILE: &str = "prompt.md";
pub const STDOUT_FILE: &str = "agent-stdout.txt";
pub const STDERR_FILE: &str = "agent-stderr.txt";
pub const OUTPUT_FILE: &str = "output.md";

pub fn project_dir(root: &Path, project_id: &str) -> PathBuf {
    root.join(project_id)
}

pub fn task_dir(root: &Path, project_id: &str, task_id: &str) -> PathBuf {
    root.join(project_id).join(task_id)
}

pub fn runs_dir(task_dir: &Path) -> PathBuf {
    task_dir.join(RUNS_DIR)
}

pub fn run_dir(task_dir: &Path, run_id: &str) -> PathBuf {
    task_dir.join(RUNS_DIR).join(run_id)
}

pub fn run_info_path(run_dir: &Path) -> PathBuf {
    run_dir.join(RUN_INFO_FILE)
}

pub fn done_path(task_dir: &Path) -> PathBuf {
    task_dir.join(DONE_FILE)
}

pub fn task_bus_path(task_dir: &Path) -> PathBuf {
    task_dir.join(TASK_BUS_FILE)
}

pub fn project_bus_path(root: &Path, project_id: &str) -> PathBuf {
    project_dir(root, project_id).join(PROJECT_BUS_FILE)
}

/// Infer `(project_id, task_id, run_id)` from a run-info path shaped like
/// `<root>/<project>/<task>/runs/<run>/run-info.yaml`.
pub fn scope_from_run_info_path(path: &Path) -> Option<(String, String, String)> {
    let run_dir = path.parent()?;
    let run_id = run_dir.file_name()?.to_str()?;
    let runs = run_dir.parent()?;
    if runs.file_name()?.to_str()? != RUNS_DIR {
        return None;
    }
    let task = runs.parent()?;
    let task_id = task.file_name()?.to_str()?;
    let project_id = task.parent()?.file_name()?.to_str()?;
    Some((project_id.to_string(), task_id.to_string(), run_id.to_string()))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
