// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared plumbing for backends that wrap a command-line executor.

use super::{AgentError, RunContext};
use crate::process::{spawn_agent, AgentProcess, CommandSpec};
use std::time::Duration;

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn `program args...` with the run's stdio files and environment.
pub(super) fn spawn_cli(
    program: &str,
    args: Vec<String>,
    ctx: &RunContext,
) -> Result<AgentProcess, AgentError> {
    let spec = CommandSpec::new(program, &ctx.stdout_path, &ctx.stderr_path)
        .args(args)
        .env(ctx.environment.clone())
        .cwd(&ctx.working_dir)
        .stdin_path(&ctx.prompt_path);
    Ok(spawn_agent(&ctx.run_id, spec)?)
}

/// First non-empty line of `program --version`, if it answers in time.
pub(super) async fn detect_version(program: &str) -> Option<String> {
    let output = tokio::process::Command::new(program)
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(VERSION_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(_)) | Ok(Err(_)) => return None,
        Err(_) => {
            tracing::debug!(program, "version check timed out");
            return None;
        }
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

pub(super) fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
