// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `conductord job`: one supervised run, in the foreground.
//!
//! Agents call this to start helper runs. Inside an agent the task and the
//! parent run come from the `CONDUCTOR_*` variables it was started with, so
//! the new run is recorded as a child of the caller.

use std::path::PathBuf;

use clap::Args;
use conductor_engine::{run_job, JobOptions, JobOutcome};
use tokio_util::sync::CancellationToken;

use crate::config::{agent_registry, Cli};
use crate::env;
use crate::lifecycle::LifecycleError;

#[derive(Args, Debug, Clone, Default)]
pub struct JobArgs {
    /// Storage root; defaults to the daemon's.
    #[arg(long, env = "CONDUCTOR_RUNS_DIR")]
    pub root: Option<PathBuf>,
    #[arg(long = "project", env = "CONDUCTOR_PROJECT_ID")]
    pub project_id: String,
    #[arg(long = "task", env = "CONDUCTOR_TASK_ID")]
    pub task_id: String,
    /// Registered agent backend to run.
    #[arg(long)]
    pub agent_type: String,
    #[arg(long, required_unless_present = "prompt_file", conflicts_with = "prompt_file")]
    pub prompt: Option<String>,
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,
    /// Working directory; defaults to the task directory.
    #[arg(long)]
    pub cwd: Option<PathBuf>,
    /// Defaults to the calling agent's own run.
    #[arg(long, env = "CONDUCTOR_RUN_ID")]
    pub parent_run_id: Option<String>,
    #[arg(long)]
    pub previous_run_id: Option<String>,
    #[arg(long, env = "CONDUCTOR_URL")]
    pub conductor_url: Option<String>,
}

impl JobArgs {
    /// Resolve the flags into engine options.
    pub fn options(&self, cli: &Cli) -> Result<JobOptions, LifecycleError> {
        let root = match self.root.as_ref().or(cli.root.as_ref()) {
            Some(root) => root.clone(),
            None => env::root_dir()?,
        };
        let prompt = match &self.prompt_file {
            Some(path) => std::fs::read_to_string(path)?,
            None => self.prompt.clone().unwrap_or_default(),
        };

        let mut opts =
            JobOptions::new(root, self.agent_type.trim(), prompt).agents(agent_registry(cli)?);
        opts.working_dir = self.cwd.clone();
        opts.parent_run_id = non_empty(&self.parent_run_id);
        opts.previous_run_id = non_empty(&self.previous_run_id);
        opts.conductor_url = non_empty(&self.conductor_url);
        Ok(opts)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Run the job until its agent exits. SIGINT or SIGTERM cancel it.
pub async fn run(cli: &Cli, args: &JobArgs) -> Result<JobOutcome, LifecycleError> {
    let cancel = CancellationToken::new();
    crate::spawn_signal_handler(cancel.clone())?;
    let opts = args.options(cli)?.cancel(cancel.clone());

    let outcome = run_job(args.project_id.trim(), args.task_id.trim(), opts).await;
    cancel.cancel();
    let outcome = outcome?;
    tracing::info!(
        run_id = %outcome.run_id,
        status = %outcome.status,
        exit_code = outcome.exit_code,
        "job finished"
    );
    Ok(outcome)
}

/// Process exit status for an agent exit code; codes outside `0..=255` map to 1.
pub fn exit_status(exit_code: i32) -> u8 {
    u8::try_from(exit_code).unwrap_or(1)
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
