// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor announcements on a task's message log.

use crate::{blocking, SupervisorError};
use conductor_core::{Message, MessageType};
use conductor_storage::MessageLog;

/// A message log bound to one task.
#[derive(Debug, Clone)]
pub struct TaskBus {
    log: MessageLog,
    project_id: String,
    task_id: String,
}

impl TaskBus {
    pub fn new(log: MessageLog, project_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self { log, project_id: project_id.into(), task_id: task_id.into() }
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Append one message; `run_id` may be empty for task-level notes.
    pub async fn post(
        &self,
        msg_type: MessageType,
        run_id: &str,
        body: impl Into<String>,
    ) -> Result<String, SupervisorError> {
        let msg = Message::new(msg_type, &self.project_id, body)
            .task_id(&self.task_id)
            .run_id(run_id);
        let log = self.log.clone();
        let msg_id = blocking(move || log.append(msg)).await.inspect_err(|e| {
            tracing::error!(
                project_id = %self.project_id,
                task_id = %self.task_id,
                run_id,
                message_type = %msg_type,
                error = %e,
                "failed to post message"
            );
        })?;
        tracing::debug!(
            task_id = %self.task_id,
            run_id,
            message_type = %msg_type,
            msg_id = %msg_id,
            "posted"
        );
        Ok(msg_id)
    }
}
