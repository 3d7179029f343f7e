// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task and project identifiers, and derived task status.

use crate::run::{RunInfo, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_PROJECT_ID_LEN: usize = 64;
const MAX_SLUG_LEN: usize = 50;
const RANDOM_SLUG_LEN: usize = 6;
const SLUG_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Rejected identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("{kind} is required")]
    Empty { kind: &'static str },
    #[error("{kind} {value:?} is not a safe path component")]
    Unsafe { kind: &'static str, value: String },
    #[error("{kind} {value:?} is malformed: {reason}")]
    Malformed { kind: &'static str, value: String, reason: &'static str },
}

fn check_path_component(kind: &'static str, value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(IdError::Unsafe { kind, value: value.to_string() });
    }
    Ok(())
}

fn is_slug_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// Validate a project id: lowercase alphanumerics and inner hyphens.
pub fn validate_project_id(project_id: &str) -> Result<(), IdError> {
    const KIND: &str = "project_id";
    check_path_component(KIND, project_id)?;
    let malformed =
        |reason| IdError::Malformed { kind: KIND, value: project_id.to_string(), reason };
    if project_id.len() > MAX_PROJECT_ID_LEN {
        return Err(malformed("longer than 64 characters"));
    }
    if !project_id.chars().all(|c| is_slug_char(c) || c == '-') {
        return Err(malformed("only lowercase letters, digits and '-' are allowed"));
    }
    if project_id.starts_with('-') || project_id.ends_with('-') {
        return Err(malformed("must start and end with a letter or digit"));
    }
    Ok(())
}

/// Validate a task id of the form `task-YYYYMMDD-HHMMSS-<slug>`.
pub fn validate_task_id(task_id: &str) -> Result<(), IdError> {
    const KIND: &str = "task_id";
    check_path_component(KIND, task_id)?;
    let malformed = |reason| IdError::Malformed { kind: KIND, value: task_id.to_string(), reason };

    let rest = task_id.strip_prefix("task-").ok_or_else(|| malformed("missing 'task-' prefix"))?;
    let mut parts = rest.splitn(3, '-');
    let date = parts.next().unwrap_or_default();
    let time = parts.next().unwrap_or_default();
    let slug = parts.next().unwrap_or_default();

    let all_digits = |s: &str, n: usize| s.len() == n && s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(date, 8) || !all_digits(time, 6) {
        return Err(malformed("expected task-YYYYMMDD-HHMMSS-<slug>"));
    }
    if slug.len() < 3 || slug.len() > MAX_SLUG_LEN {
        return Err(malformed("slug must be 3-50 characters"));
    }
    if !slug.chars().all(|c| is_slug_char(c) || c == '-') {
        return Err(malformed("slug may only contain lowercase letters, digits and '-'"));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(malformed("slug must start and end with a letter or digit"));
    }
    Ok(())
}

/// Generate a task id stamped with `at`.
///
/// The slug is derived from `hint` when it yields at least three usable
/// characters, otherwise it is random.
pub fn generate_task_id(at: DateTime<Utc>, hint: Option<&str>) -> String {
    let slug = hint.map(slugify).filter(|s| s.len() >= 3).unwrap_or_else(|| {
        nanoid::nanoid!(RANDOM_SLUG_LEN, &SLUG_ALPHABET)
    });
    format!("task-{}-{}", at.format("%Y%m%d-%H%M%S"), slug)
}

fn slugify(hint: &str) -> String {
    let mut slug = String::new();
    for c in hint.trim().to_lowercase().chars() {
        if is_slug_char(c) {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    slug.trim_matches('-').to_string()
}

/// Aggregate task status, derived from the run records and the done marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

crate::simple_display! {
    TaskStatus {
        Idle => "idle",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

impl TaskStatus {
    /// Derive the status of a task from all of its runs.
    ///
    /// Any active run keeps the task running. Otherwise the done marker wins,
    /// and without it the most recent root run decides.
    pub fn derive(runs: &[RunInfo], done: bool) -> Self {
        if runs.iter().any(|r| r.status == RunStatus::Running) {
            return TaskStatus::Running;
        }
        if done {
            return TaskStatus::Completed;
        }
        let latest_root =
            runs.iter().filter(|r| !r.is_child()).max_by(|a, b| a.run_id.cmp(&b.run_id));
        match latest_root {
            None => TaskStatus::Idle,
            Some(r) if r.status == RunStatus::Failed => TaskStatus::Failed,
            Some(_) => TaskStatus::Idle,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
