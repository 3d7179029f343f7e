// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable run records under `root/<project>/<task>/runs/<run_id>/`.

mod atomic;

pub use atomic::{read_run_info, update_run_info, write_run_info};
pub use conductor_core::{validate_project_id, validate_task_id};

use conductor_core::id::run_id_at;
use conductor_core::paths::{self, RUNS_DIR, RUN_INFO_FILE};
use conductor_core::{Clock, IdError, RunInfo, RunStatus, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from run record storage.
#[derive(Debug, Error)]
pub enum RunStoreError {
    #[error("invalid id: {0}")]
    InvalidId(#[from] IdError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("timed out locking {0}")]
    LockTimeout(PathBuf),
}

/// Run records rooted at a storage directory.
pub struct RunStore<C: Clock = SystemClock> {
    root: PathBuf,
    clock: C,
    index: Mutex<HashMap<String, PathBuf>>,
}

impl RunStore<SystemClock> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, SystemClock)
    }
}

impl<C: Clock> RunStore<C> {
    pub fn with_clock(root: impl Into<PathBuf>, clock: C) -> Self {
        Self { root: root.into(), clock, index: Mutex::new(HashMap::new()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a run directory and persist a `running` record for it.
    pub fn create_run(
        &self,
        project_id: &str,
        task_id: &str,
        agent_type: &str,
    ) -> Result<RunInfo, RunStoreError> {
        validate_project_id(project_id)?;
        validate_task_id(task_id)?;
        if agent_type.trim().is_empty() {
            return Err(RunStoreError::InvalidId(IdError::Empty { kind: "agent_type" }));
        }

        let now = self.clock.utc_now();
        let pid = std::process::id();
        let run_id = run_id_at(now, pid);
        let task_dir = paths::task_dir(&self.root, project_id, task_id);
        let run_dir = paths::run_dir(&task_dir, &run_id);
        std::fs::create_dir_all(&run_dir)?;

        let mut info = RunInfo::started(&run_id, project_id, task_id, agent_type, now);
        info.pid = pid as i32;
        info.pgid = pid as i32;
        let path = paths::run_info_path(&run_dir);
        write_run_info(&path, &info)?;
        self.index.lock().insert(run_id, path);
        Ok(info)
    }

    /// Set status and exit code. Terminal statuses also stamp `end_time`.
    pub fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        exit_code: i32,
    ) -> Result<RunInfo, RunStoreError> {
        let path = self.locate(run_id)?;
        let now = self.clock.utc_now();
        update_run_info(&path, |info| info.set_status(status, exit_code, now))
    }

    pub fn get_run_info(&self, run_id: &str) -> Result<RunInfo, RunStoreError> {
        read_run_info(&self.locate(run_id)?)
    }

    /// Path of the run-info file for `run_id`.
    pub fn run_info_path(&self, run_id: &str) -> Result<PathBuf, RunStoreError> {
        self.locate(run_id)
    }

    /// Runs of one task, sorted by run id.
    pub fn list_runs(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<Vec<RunInfo>, RunStoreError> {
        validate_project_id(project_id)?;
        validate_task_id(task_id)?;
        let task_dir = paths::task_dir(&self.root, project_id, task_id);
        Ok(scan_task_runs(&task_dir)?.into_iter().map(|(_, info)| info).collect())
    }

    /// Every run under the root, sorted by run id.
    pub fn all_runs(&self) -> Result<Vec<RunInfo>, RunStoreError> {
        let mut runs = Vec::new();
        for task_dir in task_dirs(&self.root)? {
            runs.extend(scan_task_runs(&task_dir)?.into_iter().map(|(_, info)| info));
        }
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(runs)
    }

    fn locate(&self, run_id: &str) -> Result<PathBuf, RunStoreError> {
        if run_id.trim().is_empty() || run_id.contains(['/', '\\']) || run_id.starts_with('.') {
            return Err(RunStoreError::NotFound(run_id.to_string()));
        }
        if let Some(path) = self.index.lock().get(run_id) {
            return Ok(path.clone());
        }
        for task_dir in task_dirs(&self.root)? {
            let path = paths::run_info_path(&paths::run_dir(&task_dir, run_id));
            if path.is_file() {
                self.index.lock().insert(run_id.to_string(), path.clone());
                return Ok(path);
            }
        }
        Err(RunStoreError::NotFound(run_id.to_string()))
    }
}

/// Task directories (`root/<project>/<task>`) that contain a `runs/` folder.
pub fn task_dirs(root: &Path) -> Result<Vec<PathBuf>, RunStoreError> {
    let mut dirs = Vec::new();
    for project in sorted_subdirs(root)? {
        for task in sorted_subdirs(&project)? {
            if task.join(RUNS_DIR).is_dir() {
                dirs.push(task);
            }
        }
    }
    Ok(dirs)
}

/// Read every run record of one task, sorted by run id.
///
/// Run directories without a readable record are reported with status
/// `unknown` so that they still show up in listings.
pub fn scan_task_runs(task_dir: &Path) -> Result<Vec<(PathBuf, RunInfo)>, RunStoreError> {
    let mut runs = Vec::new();
    for run_dir in sorted_subdirs(&paths::runs_dir(task_dir))? {
        let path = run_dir.join(RUN_INFO_FILE);
        match read_run_info(&path) {
            Ok(info) => runs.push((path, info)),
            Err(RunStoreError::NotFound(_)) | Err(RunStoreError::Yaml(_)) => {
                let Some((project_id, task_id, run_id)) = paths::scope_from_run_info_path(&path)
                else {
                    continue;
                };
                tracing::debug!(path = %path.display(), "run directory without readable record");
                runs.push((path, RunInfo::unknown(run_id, project_id, task_id)));
            }
            Err(e) => return Err(e),
        }
    }
    runs.sort_by(|a, b| a.1.run_id.cmp(&b.1.run_id));
    Ok(runs)
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, RunStoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
