// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task loop.
//!
//! The root agent is restarted until someone writes the task's `DONE`
//! marker. After that the task is only finished once every child run the
//! agents spawned has exited too.

use crate::children::{find_active_children, wait_for_children};
use crate::job::{run_job, JobOptions};
use crate::{blocking, SupervisorError, TaskBus};
use conductor_adapters::AgentRegistry;
use conductor_core::paths;
use conductor_core::{validate_project_id, validate_task_id, MessageType, RunStatus};
use conductor_storage::{scan_task_runs, MessageLog, MessageLogOptions, RunStoreError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Prepended to the prompt of every attempt after the first.
pub const RESTART_PREFIX: &str = "Continue working on the following:\n\n";

/// Options for [`run_task`].
#[derive(Debug, Clone)]
pub struct TaskOptions {
    pub root_dir: PathBuf,
    pub agent_type: String,
    pub agents: AgentRegistry,
    pub prompt: String,
    pub working_dir: Option<PathBuf>,
    /// How long to wait for child runs once the task is done.
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    pub max_restarts: u32,
    pub restart_delay: Duration,
    pub environment: Vec<(String, String)>,
    /// Continue an earlier attempt: the first run already gets the restart
    /// prompt and links to the latest root run.
    pub resume: bool,
    pub conductor_url: Option<String>,
    pub log_options: MessageLogOptions,
    pub kill_grace: Duration,
    pub cancel: CancellationToken,
}

impl TaskOptions {
    pub fn new(
        root_dir: impl Into<PathBuf>,
        agent_type: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            root_dir: root_dir.into(),
            agent_type: agent_type.into(),
            agents: AgentRegistry::with_defaults(),
            prompt: prompt.into(),
            working_dir: None,
            wait_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            max_restarts: 100,
            restart_delay: Duration::from_secs(1),
            environment: Vec::new(),
            resume: false,
            conductor_url: None,
            log_options: MessageLogOptions::default(),
            kill_grace: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    conductor_core::setters! {
        set {
            agents: AgentRegistry,
            wait_timeout: Duration,
            poll_interval: Duration,
            max_restarts: u32,
            restart_delay: Duration,
            environment: Vec<(String, String)>,
            resume: bool,
            log_options: MessageLogOptions,
            kill_grace: Duration,
            cancel: CancellationToken,
        }
        option {
            working_dir: PathBuf,
            conductor_url: String,
        }
    }

    fn job(&self, prompt: String, previous_run_id: Option<String>, log: &MessageLog) -> JobOptions {
        JobOptions {
            root_dir: self.root_dir.clone(),
            agent_type: self.agent_type.clone(),
            agents: self.agents.clone(),
            prompt,
            working_dir: self.working_dir.clone(),
            parent_run_id: None,
            previous_run_id,
            environment: self.environment.clone(),
            message_log: Some(log.clone()),
            conductor_url: self.conductor_url.clone(),
            kill_grace: self.kill_grace,
            cancel: self.cancel.clone(),
        }
    }
}

fn is_done(task_dir: &Path) -> bool {
    paths::done_path(task_dir).is_file()
}

/// Latest root run of the task, for linking a resumed attempt.
fn latest_root_run(task_dir: &Path) -> Result<Option<String>, RunStoreError> {
    Ok(scan_task_runs(task_dir)?
        .into_iter()
        .map(|(_, info)| info)
        .filter(|info| !info.is_child() && info.status != RunStatus::Unknown)
        .map(|info| info.run_id)
        .next_back())
}

/// Supervise a task until it is done and all its child runs have exited.
pub async fn run_task(
    project_id: &str,
    task_id: &str,
    opts: TaskOptions,
) -> Result<(), SupervisorError> {
    validate_project_id(project_id).map_err(RunStoreError::from)?;
    validate_task_id(task_id).map_err(RunStoreError::from)?;

    let task_dir = paths::task_dir(&opts.root_dir, project_id, task_id);
    std::fs::create_dir_all(paths::runs_dir(&task_dir))?;
    let task_prompt = task_dir.join(paths::TASK_PROMPT_FILE);
    if !task_prompt.exists() {
        std::fs::write(&task_prompt, &opts.prompt)?;
    }
    let log = MessageLog::open(paths::task_bus_path(&task_dir), opts.log_options.clone())?;
    let bus = TaskBus::new(log.clone(), project_id, task_id);

    let mut previous = if opts.resume {
        let dir = task_dir.clone();
        blocking(move || latest_root_run(&dir)).await?
    } else {
        None
    };
    let mut restarts: u32 = 0;
    tracing::info!(
        project_id,
        task_id,
        agent_type = %opts.agent_type,
        resume = opts.resume,
        "task started"
    );

    loop {
        if opts.cancel.is_cancelled() {
            return Err(SupervisorError::Cancelled);
        }
        if is_done(&task_dir) {
            return finish(&bus, &task_dir, &opts).await;
        }
        if restarts >= opts.max_restarts {
            bus.post(
                MessageType::Error,
                "",
                format!("task failed: max restarts ({}) exceeded", opts.max_restarts),
            )
            .await?;
            return Err(SupervisorError::MaxRestartsExceeded(opts.max_restarts));
        }

        let starting = format!("starting root agent (restart #{restarts})");
        bus.post(MessageType::Info, "", starting).await?;
        let prompt = if restarts > 0 || opts.resume {
            format!("{RESTART_PREFIX}{}", opts.prompt)
        } else {
            opts.prompt.clone()
        };
        match run_job(project_id, task_id, opts.job(prompt, previous.clone(), &log)).await {
            Ok(outcome) => {
                if outcome.status != RunStatus::Completed {
                    bus.post(
                        MessageType::Warning,
                        &outcome.run_id,
                        format!(
                            "root agent failed on restart #{restarts}: exited with code {}",
                            outcome.exit_code
                        ),
                    )
                    .await?;
                }
                previous = Some(outcome.run_id);
            }
            Err(SupervisorError::Cancelled) => return Err(SupervisorError::Cancelled),
            Err(e) => {
                tracing::warn!(task_id, restart = restarts, error = %e, "root agent failed");
                let warning = format!("root agent failed on restart #{restarts}: {e}");
                bus.post(MessageType::Warning, "", warning).await?;
            }
        }
        restarts += 1;

        if is_done(&task_dir) {
            return finish(&bus, &task_dir, &opts).await;
        }
        tokio::select! {
            _ = opts.cancel.cancelled() => return Err(SupervisorError::Cancelled),
            _ = tokio::time::sleep(opts.restart_delay) => {}
        }
    }
}

/// The done marker is present: wait out the child runs.
async fn finish(bus: &TaskBus, task_dir: &Path, opts: &TaskOptions) -> Result<(), SupervisorError> {
    let dir = task_dir.to_path_buf();
    let children = match blocking(move || find_active_children(&dir)).await {
        Ok(children) => children,
        Err(e) => {
            bus.post(MessageType::Warning, "", format!("failed to enumerate children: {e}")).await?;
            Vec::new()
        }
    };
    if children.is_empty() {
        bus.post(MessageType::Info, "", "task completed (DONE marker present, no active children)")
            .await?;
        return Ok(());
    }

    let ids: Vec<&str> = children.iter().map(|c| c.run_id.as_str()).collect();
    bus.post(
        MessageType::Info,
        "",
        format!("waiting for {} children to complete: {}", children.len(), ids.join(", ")),
    )
    .await?;

    match wait_for_children(task_dir, opts.wait_timeout, opts.poll_interval, &opts.cancel).await {
        Ok(()) => {
            bus.post(MessageType::Info, "", "task completed (all children finished)").await?;
            Ok(())
        }
        Err(SupervisorError::WaitTimeout { pending }) => {
            bus.post(
                MessageType::Warning,
                "",
                format!(
                    "timeout waiting for children after {}s: {}",
                    opts.wait_timeout.as_secs(),
                    pending.join(", ")
                ),
            )
            .await?;
            Err(SupervisorError::WaitTimeout { pending })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
