// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude Code CLI backend (`claude -p ... --output-format stream-json`).

use super::cli::{detect_version, spawn_cli, to_args};
use super::stream_json::{event_type, events, text_of};
use super::{Agent, AgentError, RunContext};
use crate::process::AgentProcess;
use async_trait::async_trait;

const ARGS: &[&str] = &[
    "-p",
    "--input-format",
    "text",
    "--output-format",
    "stream-json",
    "--verbose",
    "--permission-mode",
    "bypassPermissions",
];

#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    program: String,
}

impl Default for ClaudeAgent {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ClaudeAgent {
    /// Use `program` instead of `claude` from `PATH`.
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl Agent for ClaudeAgent {
    fn agent_type(&self) -> &str {
        "claude"
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

/// The successful `result` event wins; otherwise assistant text blocks are
/// joined in order.
fn parse_stream(stdout: &str) -> Option<String> {
    let mut parts = Vec::new();
    for event in events(stdout) {
        match event_type(&event) {
            "result" => {
                let is_error = event.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false);
                let result = text_of(event.get("result"), &[]);
                if !is_error && !result.is_empty() {
                    return Some(result);
                }
            }
            "assistant" => {
                let content = event.pointer("/message/content").and_then(|c| c.as_array());
                for block in content.into_iter().flatten() {
                    if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                        let text = text_of(block.get("text"), &[]);
                        if !text.is_empty() {
                            parts.push(text);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    (!parts.is_empty()).then(|| parts.join("\n"))
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
