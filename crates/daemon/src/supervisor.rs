// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background `run_task` loops owned by the daemon.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use conductor_engine::{run_task, SupervisorError, TaskOptions};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Config;

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// `(project_id, task_id)` of a supervised task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub project_id: String,
    pub task_id: String,
}

impl TaskKey {
    pub fn new(project_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self { project_id: project_id.into(), task_id: task_id.into() }
    }
}

/// What to supervise.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub key: TaskKey,
    pub agent_type: String,
    pub prompt: String,
    pub working_dir: Option<PathBuf>,
    pub environment: Vec<(String, String)>,
    pub resume: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("task {}/{} is already being supervised", .0.project_id, .0.task_id)]
    AlreadyRunning(TaskKey),
    #[error("daemon is shutting down")]
    ShuttingDown,
}

/// A supervised task as reported by `/status`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunningTask {
    pub project_id: String,
    pub task_id: String,
    pub agent_type: String,
    pub started_at: DateTime<Utc>,
}

struct Slot {
    generation: u64,
    info: RunningTask,
}

pub struct TaskSupervisor {
    config: Arc<Config>,
    shutdown: CancellationToken,
    generation: AtomicU64,
    tasks: Mutex<HashMap<TaskKey, Slot>>,
}

impl TaskSupervisor {
    pub fn new(config: Arc<Config>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            config,
            shutdown,
            generation: AtomicU64::new(0),
            tasks: Mutex::new(HashMap::new()),
        })
    }

    fn options(&self, req: &StartRequest, cancel: CancellationToken) -> TaskOptions {
        let mut opts = TaskOptions::new(&self.config.root_dir, &req.agent_type, &req.prompt)
            .agents(self.config.agents.clone())
            .wait_timeout(self.config.wait_timeout)
            .max_restarts(self.config.max_restarts)
            .environment(req.environment.clone())
            .resume(req.resume)
            .log_options(self.config.log_options.clone())
            .conductor_url(format!("http://{}", self.config.listen_addr))
            .cancel(cancel);
        if let Some(dir) = &req.working_dir {
            opts = opts.working_dir(dir.clone());
        }
        opts
    }

    /// Spawn `run_task` for the request in the background.
    pub fn start(self: &Arc<Self>, req: StartRequest) -> Result<(), StartError> {
        if self.shutdown.is_cancelled() {
            return Err(StartError::ShuttingDown);
        }
        let mut tasks = self.tasks.lock();
        if tasks.contains_key(&req.key) {
            return Err(StartError::AlreadyRunning(req.key));
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let opts = self.options(&req, cancel);
        tasks.insert(
            req.key.clone(),
            Slot {
                generation,
                info: RunningTask {
                    project_id: req.key.project_id.clone(),
                    task_id: req.key.task_id.clone(),
                    agent_type: req.agent_type.clone(),
                    started_at: Utc::now(),
                },
            },
        );
        drop(tasks);

        let this = Arc::clone(self);
        let key = req.key;
        tracing::info!(
            project_id = %key.project_id,
            task_id = %key.task_id,
            agent_type = %req.agent_type,
            resume = req.resume,
            "task supervision started"
        );
        let span =
            tracing::info_span!("task", project_id = %key.project_id, task_id = %key.task_id);
        tokio::spawn(
            async move {
                match run_task(&key.project_id, &key.task_id, opts).await {
                    Ok(()) => tracing::info!("task completed"),
                    Err(SupervisorError::Cancelled) => tracing::info!("task supervision cancelled"),
                    Err(e) => tracing::warn!(error = %e, "task ended with error"),
                }
                this.forget(&key, generation);
            }
            .instrument(span),
        );
        Ok(())
    }

    fn forget(&self, key: &TaskKey, generation: u64) {
        let mut tasks = self.tasks.lock();
        if tasks.get(key).is_some_and(|slot| slot.generation == generation) {
            tasks.remove(key);
        }
    }

    pub fn is_running(&self, key: &TaskKey) -> bool {
        self.tasks.lock().contains_key(key)
    }

    /// Supervised tasks, sorted by project then task.
    pub fn running(&self) -> Vec<RunningTask> {
        let mut running: Vec<RunningTask> =
            self.tasks.lock().values().map(|slot| slot.info.clone()).collect();
        running.sort_by(|a, b| (&a.project_id, &a.task_id).cmp(&(&b.project_id, &b.task_id)));
        running
    }

    /// Cancel every supervised task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait until no task is supervised. Returns `false` on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = self.tasks.lock().len();
            if remaining == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(remaining, "tasks still supervised after drain timeout");
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
