// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe run-info file IO.
//!
//! Writers serialize to a temporary sibling and rename it over the target,
//! so readers see either the previous document or the new one.

use super::RunStoreError;
use crate::message_log::{LockError, LockGuard};
use conductor_core::paths::scope_from_run_info_path;
use conductor_core::{RunInfo, RUN_INFO_VERSION};
use std::fs::{File, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const RUN_INFO_MODE: u32 = 0o644;
const UPDATE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const SLOW_LOCK_WAIT: Duration = Duration::from_millis(200);

/// Atomically replace the run-info document at `path`.
pub fn write_run_info(path: &Path, info: &RunInfo) -> Result<(), RunStoreError> {
    let yaml = serde_yaml::to_string(info)?;
    write_file_atomic(path, yaml.as_bytes()).inspect_err(|e| {
        tracing::error!(
            path = %path.display(),
            run_id = %info.run_id,
            error = %e,
            "failed to write run info"
        );
    })
}

/// Read a run-info document, filling fields older writers left out.
pub fn read_run_info(path: &Path) -> Result<RunInfo, RunStoreError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RunStoreError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let mut info: RunInfo = serde_yaml::from_str(&data).inspect_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "unparseable run info");
    })?;
    hydrate(&mut info, path);
    Ok(info)
}

fn hydrate(info: &mut RunInfo, path: &Path) {
    if let Some((project_id, task_id, run_id)) = scope_from_run_info_path(path) {
        if info.run_id.trim().is_empty() {
            info.run_id = run_id;
        }
        if info.project_id.trim().is_empty() {
            info.project_id = project_id;
        }
        if info.task_id.trim().is_empty() {
            info.task_id = task_id;
        }
    }
    if info.version == 0 {
        info.version = RUN_INFO_VERSION;
    }
    info.hydrate_status();
}

/// Read-modify-write under the `<path>.lock` sidecar.
pub fn update_run_info<F>(path: &Path, update: F) -> Result<RunInfo, RunStoreError>
where
    F: FnOnce(&mut RunInfo),
{
    let lock_path = sidecar_lock_path(path);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    let started = Instant::now();
    let _guard = match LockGuard::acquire(&lock_file, UPDATE_LOCK_TIMEOUT) {
        Ok(guard) => guard,
        Err(LockError::Timeout(_)) => return Err(RunStoreError::LockTimeout(path.to_path_buf())),
        Err(LockError::Io(e)) => return Err(e.into()),
    };
    let waited = started.elapsed();
    if waited >= SLOW_LOCK_WAIT {
        let wait_ms = waited.as_millis() as u64;
        tracing::warn!(path = %path.display(), wait_ms, "slow run info lock");
    }

    let mut info = read_run_info(path)?;
    update(&mut info);
    write_run_info(path, &info)?;
    Ok(info)
}

fn sidecar_lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn write_file_atomic(path: &Path, data: &[u8]) -> Result<(), RunStoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!("run-info.{}.yaml.tmp", nanoid::nanoid!(10)));

    let result = (|| -> std::io::Result<()> {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(data)?;
        tmp.sync_all()?;
        tmp.set_permissions(Permissions::from_mode(RUN_INFO_MODE))?;
        drop(tmp);
        std::fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        if let Err(cleanup) = std::fs::remove_file(&tmp_path) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %tmp_path.display(),
                    error = %cleanup,
                    "failed to remove temp file"
                );
            }
        }
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
