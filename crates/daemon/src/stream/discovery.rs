// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use conductor_core::paths;
use conductor_storage::{task_dirs, RunStoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DISCOVERY_BUFFER: usize = 32;

/// Finds run directories that appeared since the last scan.
#[derive(Debug)]
pub struct Discovery {
    root: PathBuf,
    known: HashSet<String>,
}

impl Discovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), known: HashSet::new() }
    }

    /// Run ids not returned by an earlier scan, sorted.
    pub fn scan(&mut self) -> Result<Vec<String>, RunStoreError> {
        let mut fresh = Vec::new();
        for task_dir in task_dirs(&self.root)? {
            let entries = match std::fs::read_dir(paths::runs_dir(&task_dir)) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries.flatten() {
                if !entry.path().is_dir() {
                    continue;
                }
                let Some(run_id) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if self.known.insert(run_id.clone()) {
                    fresh.push(run_id);
                }
            }
        }
        fresh.sort();
        Ok(fresh)
    }

    /// Scan every `interval` and send new run ids until `cancel` fires or
    /// the receiver is dropped.
    pub fn spawn(
        mut self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(DISCOVERY_BUFFER);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let fresh = match self.scan() {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        tracing::warn!(
                            root = %self.root.display(),
                            error = %e,
                            "run discovery failed"
                        );
                        continue;
                    }
                };
                for run_id in fresh {
                    tracing::debug!(run_id = %run_id, "discovered run");
                    if tx.send(run_id).await.is_err() {
                        return;
                    }
                }
            }
        });
        rx
    }
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
