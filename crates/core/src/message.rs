// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message log entries.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Well-known message types.
///
/// The log accepts any non-empty tag; these are the ones the core itself
/// produces or gives special treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Fact,
    Progress,
    Decision,
    Error,
    Info,
    Warning,
    Question,
    Issue,
    User,
    RunStart,
    RunStop,
    RunCrash,
}

crate::simple_display! {
    MessageType {
        Fact => "FACT",
        Progress => "PROGRESS",
        Decision => "DECISION",
        Error => "ERROR",
        Info => "INFO",
        Warning => "WARNING",
        Question => "QUESTION",
        Issue => "ISSUE",
        User => "USER",
        RunStart => "RUN_START",
        RunStop => "RUN_STOP",
        RunCrash => "RUN_CRASH",
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        t.to_string()
    }
}

impl PartialEq<MessageType> for String {
    fn eq(&self, other: &MessageType) -> bool {
        *self == other.to_string()
    }
}

/// Causal link from one message to an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ParentRepr")]
pub struct Parent {
    pub msg_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub meta: IndexMap<String, String>,
}

impl Parent {
    pub fn new(msg_id: impl Into<String>) -> Self {
        Self { msg_id: msg_id.into(), kind: None, meta: IndexMap::new() }
    }
}

/// Accepts both the structured form and the legacy bare-id form.
#[derive(Deserialize)]
#[serde(untagged)]
enum ParentRepr {
    Id(String),
    Full {
        msg_id: String,
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        meta: IndexMap<String, String>,
    },
}

impl From<ParentRepr> for Parent {
    fn from(repr: ParentRepr) -> Self {
        match repr {
            ParentRepr::Id(msg_id) => Parent::new(msg_id),
            ParentRepr::Full { msg_id, kind, meta } => Parent { msg_id, kind, meta },
        }
    }
}

/// External reference attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One entry in a message log.
///
/// `msg_id` and `timestamp` are assigned on append when left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub msg_id: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub project_id: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<Parent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub meta: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_path: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl Message {
    pub fn new(
        msg_type: impl Into<String>,
        project_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            msg_id: String::new(),
            timestamp: None,
            msg_type: msg_type.into(),
            project_id: project_id.into(),
            task_id: String::new(),
            run_id: String::new(),
            issue_id: None,
            parents: Vec::new(),
            links: Vec::new(),
            meta: IndexMap::new(),
            attachment_path: None,
            body: body.into(),
        }
    }

    crate::setters! {
        into {
            task_id: String,
            run_id: String,
        }
        set {
            parents: Vec<Parent>,
            links: Vec<Link>,
        }
        option {
            issue_id: String,
            attachment_path: String,
        }
    }

    /// Add one metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn is_type(&self, t: MessageType) -> bool {
        self.msg_type == t
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
