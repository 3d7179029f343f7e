// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent processes and their process groups.
//!
//! Every agent starts as the leader of a fresh process group, so the group
//! id doubles as the handle for the whole tree the agent may fork. Liveness
//! checks and termination address the group, never a single pid.

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{getpgrp, Pid};
use std::fs::{File, OpenOptions};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;

/// Errors from spawning or signalling agent processes.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process group {0} not found")]
    GroupNotFound(i32),
    #[error("failed to signal process group {pgid}: {errno}")]
    Signal { pgid: i32, errno: Errno },
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to run and where its stdio goes.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Fed to stdin; `/dev/null` when absent.
    pub stdin_path: Option<PathBuf>,
    /// Opened for append.
    pub stdout_path: PathBuf,
    /// Opened for append.
    pub stderr_path: PathBuf,
}

impl CommandSpec {
    pub fn new(
        program: impl Into<String>,
        stdout_path: impl Into<PathBuf>,
        stderr_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            stdin_path: None,
            stdout_path: stdout_path.into(),
            stderr_path: stderr_path.into(),
        }
    }

    conductor_core::setters! {
        set {
            args: Vec<String>,
            env: Vec<(String, String)>,
        }
        option {
            cwd: PathBuf,
            stdin_path: PathBuf,
        }
    }

    /// Shell-like rendering for run records and logs.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|part| shell_quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// A spawned agent process, leader of its own process group.
#[derive(Debug)]
pub struct AgentProcess {
    child: tokio::process::Child,
    pid: i32,
    command_line: String,
}

impl AgentProcess {
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Equal to the pid: the agent leads its group.
    pub fn pgid(&self) -> i32 {
        self.pid
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Wait for the leader to exit and return its exit code.
    ///
    /// Death by signal maps to `128 + signal`, as a shell would report it.
    pub async fn wait(&mut self) -> Result<i32, ProcessError> {
        let status = self.child.wait().await?;
        Ok(exit_code(status))
    }

    /// SIGTERM the whole group.
    pub fn terminate(&self) -> Result<(), ProcessError> {
        terminate_process_group(self.pgid())
    }

    /// SIGKILL the whole group.
    pub fn kill(&self) -> Result<(), ProcessError> {
        kill_process_group(self.pgid())
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

fn open_append(path: &PathBuf) -> Result<File, ProcessError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Start `spec` in a new process group.
///
/// `label` only tags log lines (usually the run id).
pub fn spawn_agent(label: &str, spec: CommandSpec) -> Result<AgentProcess, ProcessError> {
    if spec.program.trim().is_empty() {
        return Err(ProcessError::InvalidCommand("program is empty".to_string()));
    }
    if let Some(cwd) = &spec.cwd {
        if !cwd.is_dir() {
            return Err(ProcessError::InvalidCommand(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }
    }

    let stdout = open_append(&spec.stdout_path)?;
    let stderr = open_append(&spec.stderr_path)?;
    let stdin = match &spec.stdin_path {
        Some(path) => Stdio::from(File::open(path)?),
        None => Stdio::null(),
    };

    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(stdin)
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .process_group(0);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    let child = cmd
        .spawn()
        .map_err(|source| ProcessError::Spawn { program: spec.program.clone(), source })?;
    let pid = child.id().and_then(|id| i32::try_from(id).ok()).unwrap_or(0);
    let command_line = spec.command_line();
    tracing::info!(label, pid, command = %command_line, "agent process spawned");

    Ok(AgentProcess { child, pid, command_line })
}

fn signal_group(pgid: i32, signal: Signal) -> Result<(), ProcessError> {
    // Never address our own group, init, or "every process".
    if pgid <= 1 || Pid::from_raw(pgid) == getpgrp() {
        return Err(ProcessError::GroupNotFound(pgid));
    }
    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) => {
            tracing::debug!(pgid, %signal, "signalled process group");
            Ok(())
        }
        Err(Errno::ESRCH) => Err(ProcessError::GroupNotFound(pgid)),
        Err(errno) => Err(ProcessError::Signal { pgid, errno }),
    }
}

/// Send SIGTERM to every process in the group.
pub fn terminate_process_group(pgid: i32) -> Result<(), ProcessError> {
    signal_group(pgid, Signal::SIGTERM)
}

/// Send SIGKILL to every process in the group.
pub fn kill_process_group(pgid: i32) -> Result<(), ProcessError> {
    signal_group(pgid, Signal::SIGKILL)
}

/// Whether any process in the group still exists.
///
/// A group we may not signal (`EPERM`) still exists.
pub fn is_group_alive(pgid: i32) -> bool {
    if pgid <= 0 {
        return false;
    }
    match killpg(Pid::from_raw(pgid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(errno) => {
            tracing::debug!(pgid, %errno, "liveness check failed");
            false
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
