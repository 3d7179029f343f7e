// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run records: one per supervised process invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version written into every run-info document.
pub const RUN_INFO_VERSION: u32 = 1;

/// Exit code recorded before a run has exited.
pub const EXIT_CODE_PENDING: i32 = -1;

/// Lifecycle status of a run.
///
/// `Running` is the only non-terminal state. `Unknown` is only used for
/// records synthesised when a run directory has no readable run-info file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    #[default]
    Unknown,
}

crate::simple_display! {
    RunStatus {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Unknown => "unknown",
    }
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Terminal status for a process that exited with `exit_code`.
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        }
    }
}

/// Durable record of one run, serialized as `run-info.yaml`.
///
/// Field names are a compatibility surface shared with every reader of the
/// run directory, so renames go through serde attributes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub run_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_run_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub previous_run_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(rename = "agent", default)]
    pub agent_type: String,
    #[serde(default)]
    pub pid: i32,
    #[serde(default)]
    pub pgid: i32,
    #[serde(default)]
    pub start_time: DateTime<Utc>,
    /// Absent while the run is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<String>,
    #[serde(rename = "commandline", default, skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
}

impl RunInfo {
    /// A freshly started run: `running`, no end time, pending exit code.
    pub fn started(
        run_id: impl Into<String>,
        project_id: impl Into<String>,
        task_id: impl Into<String>,
        agent_type: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            version: RUN_INFO_VERSION,
            run_id: run_id.into(),
            parent_run_id: String::new(),
            previous_run_id: String::new(),
            project_id: project_id.into(),
            task_id: task_id.into(),
            agent_type: agent_type.into(),
            pid: 0,
            pgid: 0,
            start_time,
            end_time: None,
            exit_code: EXIT_CODE_PENDING,
            status: RunStatus::Running,
            cwd: None,
            prompt_path: None,
            output_path: None,
            stdout_path: None,
            stderr_path: None,
            command_line: None,
            error_summary: None,
            agent_version: None,
        }
    }

    /// Placeholder for a run directory without a readable record.
    pub fn unknown(
        run_id: impl Into<String>,
        project_id: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        let mut info = Self::started(run_id, project_id, task_id, "", DateTime::<Utc>::default());
        info.status = RunStatus::Unknown;
        info
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn is_child(&self) -> bool {
        !self.parent_run_id.is_empty()
    }

    /// Move to `status`, keeping `end_time` consistent with it.
    pub fn set_status(&mut self, status: RunStatus, exit_code: i32, at: DateTime<Utc>) {
        self.status = status;
        self.exit_code = exit_code;
        self.end_time = if status == RunStatus::Running { None } else { Some(at) };
    }

    /// Record a process exit: status follows the exit code, and failures get
    /// a classified error summary unless one is already present.
    ///
    /// Returns false, changing nothing, if the run already ended.
    pub fn finish(&mut self, exit_code: i32, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.set_status(RunStatus::from_exit_code(exit_code), exit_code, at);
        if exit_code != 0 && self.error_summary.is_none() {
            self.error_summary = Some(classify_exit_code(exit_code));
        }
        true
    }

    /// Record a failure that was not decided by the exit code alone.
    ///
    /// `exit_code` is the process's own status when it did exit; without one
    /// the recorded code stays pending. Returns false, changing nothing, if
    /// the run already ended.
    pub fn fail(
        &mut self,
        exit_code: Option<i32>,
        at: DateTime<Utc>,
        summary: impl Into<String>,
    ) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let exit_code = match exit_code {
            Some(code) => code,
            None if self.exit_code == 0 => EXIT_CODE_PENDING,
            None => self.exit_code,
        };
        self.set_status(RunStatus::Failed, exit_code, at);
        self.error_summary = Some(summary.into());
        true
    }

    /// Fill in a status for documents written without one.
    pub fn hydrate_status(&mut self) {
        if self.status != RunStatus::Unknown {
            return;
        }
        self.status = match self.end_time {
            None => RunStatus::Running,
            Some(_) => RunStatus::from_exit_code(self.exit_code),
        };
    }
}

/// Human-readable summary for a non-zero agent exit code.
pub fn classify_exit_code(exit_code: i32) -> String {
    match exit_code {
        1 => "agent reported failure".to_string(),
        2 => "agent usage error".to_string(),
        137 => "agent killed (OOM or signal)".to_string(),
        143 => "agent terminated (SIGTERM)".to_string(),
        other => format!("agent exited with code {other}"),
    }
}

crate::builder! {
    pub struct RunInfoBuilder => RunInfo {
        into {
            run_id: String = "20260101-0000000000-1-0",
            parent_run_id: String = "",
            previous_run_id: String = "",
            project_id: String = "proj",
            task_id: String = "task-20260101-000000-test",
            agent_type: String = "command",
        }
        set {
            pid: i32 = 0,
            pgid: i32 = 0,
            start_time: DateTime<Utc> = DateTime::<Utc>::default(),
            end_time: Option<DateTime<Utc>> = None,
            exit_code: i32 = EXIT_CODE_PENDING,
            status: RunStatus = RunStatus::Running,
        }
        fixed {
            version: u32 = RUN_INFO_VERSION,
            cwd: Option<String> = None,
            prompt_path: Option<String> = None,
            output_path: Option<String> = None,
            stdout_path: Option<String> = None,
            stderr_path: Option<String> = None,
            command_line: Option<String> = None,
            error_summary: Option<String> = None,
            agent_version: Option<String> = None,
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
