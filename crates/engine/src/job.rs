// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One supervised agent run, from spawn to exit.

use crate::output::{tail_lines, write_output, OutputSource};
use crate::{blocking, SupervisorError, TaskBus};
use conductor_adapters::{AgentError, AgentProcess, AgentRegistry, ProcessError, RunContext};
use conductor_core::paths::{self, OUTPUT_FILE, PROMPT_FILE, STDERR_FILE, STDOUT_FILE};
use conductor_core::{validate_project_id, validate_task_id, MessageType, RunInfo, RunStatus};
use conductor_storage::{update_run_info, MessageLog, MessageLogOptions, RunStore, RunStoreError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lines of stderr quoted in a crash report.
const STDERR_EXCERPT_LINES: usize = 50;
const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(30);

/// Options for [`run_job`].
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub root_dir: PathBuf,
    pub agent_type: String,
    pub agents: AgentRegistry,
    pub prompt: String,
    /// Defaults to the task directory.
    pub working_dir: Option<PathBuf>,
    pub parent_run_id: Option<String>,
    pub previous_run_id: Option<String>,
    /// Layered over the supervisor's own variables.
    pub environment: Vec<(String, String)>,
    /// Defaults to the task's message log.
    pub message_log: Option<MessageLog>,
    /// Exported to the agent as `CONDUCTOR_URL`.
    pub conductor_url: Option<String>,
    /// Time between SIGTERM and SIGKILL when cancelled.
    pub kill_grace: Duration,
    pub cancel: CancellationToken,
}

impl JobOptions {
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
            parent_run_id: None,
            previous_run_id: None,
            environment: Vec::new(),
            message_log: None,
            conductor_url: None,
            kill_grace: DEFAULT_KILL_GRACE,
            cancel: CancellationToken::new(),
        }
    }

    conductor_core::setters! {
        set {
            agents: AgentRegistry,
            environment: Vec<(String, String)>,
            kill_grace: Duration,
            cancel: CancellationToken,
        }
        option {
            working_dir: PathBuf,
            parent_run_id: String,
            previous_run_id: String,
            message_log: MessageLog,
            conductor_url: String,
        }
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub exit_code: i32,
    pub run_dir: PathBuf,
}

/// Files of a freshly allocated run.
struct RunFiles {
    run_dir: PathBuf,
    info_path: PathBuf,
    prompt_path: PathBuf,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    output_path: PathBuf,
}

impl RunFiles {
    fn new(run_dir: PathBuf) -> Self {
        Self {
            info_path: paths::run_info_path(&run_dir),
            prompt_path: run_dir.join(PROMPT_FILE),
            stdout_path: run_dir.join(STDOUT_FILE),
            stderr_path: run_dir.join(STDERR_FILE),
            output_path: run_dir.join(OUTPUT_FILE),
            run_dir,
        }
    }
}

/// Ensure the task skeleton, allocate the run and persist its `running` record.
fn prepare_run(
    opts: &JobOptions,
    project_id: &str,
    task_id: &str,
    working_dir: &Path,
) -> Result<(RunInfo, RunFiles), RunStoreError> {
    let task_dir = paths::task_dir(&opts.root_dir, project_id, task_id);
    std::fs::create_dir_all(paths::runs_dir(&task_dir))?;
    let task_prompt = task_dir.join(paths::TASK_PROMPT_FILE);
    if !task_prompt.exists() {
        std::fs::write(&task_prompt, &opts.prompt)?;
    }

    let created = RunStore::new(&opts.root_dir).create_run(project_id, task_id, &opts.agent_type)?;
    let files = RunFiles::new(paths::run_dir(&task_dir, &created.run_id));
    std::fs::write(&files.prompt_path, &opts.prompt)?;

    let info = update_run_info(&files.info_path, |info| {
        info.parent_run_id = opts.parent_run_id.clone().unwrap_or_default();
        info.previous_run_id = opts.previous_run_id.clone().unwrap_or_default();
        info.cwd = Some(working_dir.display().to_string());
        info.prompt_path = Some(files.prompt_path.display().to_string());
        info.output_path = Some(files.output_path.display().to_string());
        info.stdout_path = Some(files.stdout_path.display().to_string());
        info.stderr_path = Some(files.stderr_path.display().to_string());
    })?;
    Ok((info, files))
}

/// Variables every agent sees, before caller-supplied ones.
fn supervisor_environment(
    root_dir: &Path,
    info: &RunInfo,
    files: &RunFiles,
    conductor_url: Option<&str>,
) -> Vec<(String, String)> {
    let task_dir = paths::task_dir(root_dir, &info.project_id, &info.task_id);
    let mut env = vec![
        ("CONDUCTOR_PROJECT_ID", info.project_id.clone()),
        ("CONDUCTOR_TASK_ID", info.task_id.clone()),
        ("CONDUCTOR_RUN_ID", info.run_id.clone()),
        ("CONDUCTOR_PARENT_RUN_ID", info.parent_run_id.clone()),
        ("CONDUCTOR_RUNS_DIR", root_dir.display().to_string()),
        ("CONDUCTOR_MESSAGE_BUS", paths::task_bus_path(&task_dir).display().to_string()),
        ("CONDUCTOR_TASK_FOLDER", task_dir.display().to_string()),
        ("CONDUCTOR_RUN_FOLDER", files.run_dir.display().to_string()),
    ];
    if let Some(url) = conductor_url {
        env.push(("CONDUCTOR_URL", url.to_string()));
    }
    env.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Mark the run failed without a process exit to go by.
async fn record_failure(info_path: &Path, summary: String) -> Result<RunInfo, SupervisorError> {
    let path = info_path.to_path_buf();
    blocking(move || {
        update_run_info(&path, |info| {
            info.fail(None, chrono::Utc::now(), summary);
        })
    })
    .await
}

/// SIGTERM the group, then SIGKILL once `grace` has passed.
async fn stop_process(process: &mut AgentProcess, grace: Duration) -> Result<i32, SupervisorError> {
    match process.terminate() {
        Ok(()) | Err(ProcessError::GroupNotFound(_)) => {}
        Err(e) => tracing::warn!(pid = process.pid(), error = %e, "failed to terminate agent"),
    }
    if let Ok(exit) = tokio::time::timeout(grace, process.wait()).await {
        return exit.map_err(|e| SupervisorError::Agent(e.into()));
    }
    tracing::warn!(pid = process.pid(), ?grace, "agent ignored SIGTERM, killing");
    match process.kill() {
        Ok(()) | Err(ProcessError::GroupNotFound(_)) => {}
        Err(e) => tracing::warn!(pid = process.pid(), error = %e, "failed to kill agent"),
    }
    process.wait().await.map_err(|e| SupervisorError::Agent(e.into()))
}

/// Start one agent run for a task and supervise it until it exits.
///
/// A run that starts and exits, successfully or not, is an `Ok` outcome.
/// Errors mean the run could not be started or was cancelled; either way
/// its record is `failed` by the time this returns.
pub async fn run_job(
    project_id: &str,
    task_id: &str,
    opts: JobOptions,
) -> Result<JobOutcome, SupervisorError> {
    validate_project_id(project_id).map_err(RunStoreError::from)?;
    validate_task_id(task_id).map_err(RunStoreError::from)?;

    let task_dir = paths::task_dir(&opts.root_dir, project_id, task_id);
    let working_dir = opts.working_dir.clone().unwrap_or_else(|| task_dir.clone());
    let log = match opts.message_log.clone() {
        Some(log) => log,
        None => MessageLog::open(paths::task_bus_path(&task_dir), MessageLogOptions::default())?,
    };
    let bus = TaskBus::new(log, project_id, task_id);

    let (info, files) = {
        let (prepared, project, task, cwd) =
            (opts.clone(), project_id.to_string(), task_id.to_string(), working_dir.clone());
        blocking(move || prepare_run(&prepared, &project, &task, &cwd)).await?
    };
    let run_id = info.run_id.clone();
    tracing::info!(
        %run_id,
        project_id,
        task_id,
        agent_type = %opts.agent_type,
        parent_run_id = %info.parent_run_id,
        "run allocated"
    );

    let agent = match opts.agents.get(&opts.agent_type) {
        Ok(agent) => agent,
        Err(e) => {
            record_failure(&files.info_path, e.to_string()).await?;
            bus.post(MessageType::RunCrash, &run_id, format!("run failed to start: {e}")).await?;
            return Err(e.into());
        }
    };
    let agent_version = agent.version().await;

    let mut environment =
        supervisor_environment(&opts.root_dir, &info, &files, opts.conductor_url.as_deref());
    environment.extend(opts.environment.iter().cloned());
    let ctx = RunContext {
        run_id: run_id.clone(),
        project_id: project_id.to_string(),
        task_id: task_id.to_string(),
        prompt_path: files.prompt_path.clone(),
        working_dir,
        stdout_path: files.stdout_path.clone(),
        stderr_path: files.stderr_path.clone(),
        environment,
    };

    let mut process = match agent.execute(&ctx).await {
        Ok(process) => process,
        Err(e) => {
            tracing::error!(%run_id, error = %e, "agent failed to start");
            record_failure(&files.info_path, format!("spawn failed: {e}")).await?;
            bus.post(MessageType::RunCrash, &run_id, format!("run failed to start: {e}")).await?;
            return Err(e.into());
        }
    };

    let (pid, command_line) = (process.pid(), process.command_line().to_string());
    let recorded = {
        let path = files.info_path.clone();
        let version = agent_version.clone();
        blocking(move || {
            update_run_info(&path, |info| {
                info.pid = pid;
                info.pgid = pid;
                info.command_line = Some(command_line);
                info.agent_version = version;
            })
        })
        .await
    };
    let start_body = format!(
        "run started\nrun_dir: {}\nprompt: {}\nstdout: {}\nstderr: {}\noutput: {}",
        files.run_dir.display(),
        files.prompt_path.display(),
        files.stdout_path.display(),
        files.stderr_path.display(),
        files.output_path.display(),
    );
    let announced = match recorded {
        Ok(_) => bus.post(MessageType::RunStart, &run_id, start_body).await.map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = announced {
        let _ = process.kill();
        let _ = process.wait().await;
        record_failure(&files.info_path, format!("failed to record start: {e}")).await?;
        return Err(e);
    }

    let waited = tokio::select! {
        exit = process.wait() => Some(exit),
        _ = opts.cancel.cancelled() => None,
    };
    let (exit_code, cancelled) = match waited {
        Some(exit) => (exit.map_err(AgentError::from)?, false),
        None => {
            tracing::info!(%run_id, pid, "cancelling run");
            (stop_process(&mut process, opts.kill_grace).await?, true)
        }
    };

    let finished = {
        let path = files.info_path.clone();
        blocking(move || {
            update_run_info(&path, |info| {
                let now = chrono::Utc::now();
                let applied = if cancelled {
                    info.fail(Some(exit_code), now, "cancelled")
                } else {
                    info.finish(exit_code, now)
                };
                if !applied {
                    tracing::warn!(
                        run_id = %info.run_id,
                        status = %info.status,
                        exit_code,
                        "run already ended, keeping its record"
                    );
                }
            })
        })
        .await?
    };
    tracing::info!(%run_id, exit_code, status = %finished.status, "run finished");

    let output = {
        let (stdout, out) = (files.stdout_path.clone(), files.output_path.clone());
        let agent = agent.clone();
        tokio::task::spawn_blocking(move || write_output(agent.as_ref(), &stdout, &out)).await
    };
    match output {
        Ok(Ok(OutputSource::Normalized)) => {}
        Ok(Ok(OutputSource::Raw)) => tracing::debug!(%run_id, "output.md copied from raw stdout"),
        Ok(Err(e)) => tracing::warn!(%run_id, error = %e, "failed to write output.md"),
        Err(e) => tracing::warn!(%run_id, error = %e, "output task failed"),
    }

    let mut stop_body = format!(
        "run stopped with code {exit_code}\nrun_dir: {}\noutput: {}",
        files.run_dir.display(),
        files.output_path.display(),
    );
    if finished.status == RunStatus::Failed {
        let excerpt = tail_lines(&files.stderr_path, STDERR_EXCERPT_LINES);
        if !excerpt.is_empty() {
            let heading = format!("## stderr (last {STDERR_EXCERPT_LINES} lines)");
            stop_body.push_str(&format!("\n\n{heading}\n{excerpt}"));
        }
    }
    let stop_type =
        if exit_code == 0 && !cancelled { MessageType::RunStop } else { MessageType::RunCrash };
    bus.post(stop_type, &run_id, stop_body).await?;

    if cancelled {
        return Err(SupervisorError::Cancelled);
    }
    Ok(JobOutcome { run_id, status: finished.status, exit_code, run_dir: files.run_dir })
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
