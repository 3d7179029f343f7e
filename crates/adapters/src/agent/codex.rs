// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenAI Codex CLI backend (`codex exec --json -`).

use super::cli::{detect_version, spawn_cli, to_args};
use super::stream_json::{event_type, events, text_of, Transcript};
use super::{Agent, AgentError, RunContext};
use crate::process::AgentProcess;
use async_trait::async_trait;
use serde_json::Value;

const ARGS: &[&str] = &["exec", "--dangerously-bypass-approvals-and-sandbox", "--json", "-"];
const TEXT_KEYS: &[&str] = &["text", "content", "result", "message", "output", "output_text"];

#[derive(Debug, Clone)]
pub struct CodexAgent {
    program: String,
}

impl Default for CodexAgent {
    fn default() -> Self {
        Self::new("codex")
    }
}

impl CodexAgent {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl Agent for CodexAgent {
    fn agent_type(&self) -> &str {
        "codex"
    }

    async fn execute(&self, ctx: &RunContext) -> Result<AgentProcess, AgentError> {
        spawn_cli(&self.program, to_args(ARGS), ctx)
    }

    fn normalize_output(&self, stdout: &str) -> Option<String> {
        parse_stream(stdout)
    }

    async fn version(&self) -> Option<String> {
        detect_version(&self.program).await
    }
}

fn parse_stream(stdout: &str) -> Option<String> {
    let mut transcript = Transcript::default();
    for event in events(stdout) {
        transcript.push(&top_level_text(&event));
        transcript.push(&item_text(event.get("item")));
    }
    transcript.finish()
}

/// Only final or message events carry answer text; everything else is
/// progress or tool output.
fn top_level_text(event: &Value) -> String {
    match event_type(event) {
        "result" | "response.completed" | "turn.completed" | "message" => {
            ["result", "output_text", "text", "content", "message"]
                .iter()
                .map(|key| text_of(event.get(*key), TEXT_KEYS))
                .find(|text| !text.is_empty())
                .unwrap_or_default()
        }
        _ => String::new(),
    }
}

fn item_text(item: Option<&Value>) -> String {
    let Some(item) = item.filter(|v| v.is_object()) else {
        return String::new();
    };
    let item_type = item.get("type").and_then(Value::as_str).unwrap_or_default().trim();
    if !matches!(item_type, "" | "agent_message" | "message") {
        return String::new();
    }
    ["text", "output_text", "content", "message"]
        .iter()
        .map(|key| text_of(item.get(*key), TEXT_KEYS))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "codex_tests.rs"]
mod tests;
