// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Google Gemini CLI backend (`gemini --output-format stream-json`).

use super::cli::{detect_version, spawn_cli, to_args};
use super::stream_json::{event_type, events, text_of, Transcript};
use super::{Agent, AgentError, RunContext};
use crate::process::AgentProcess;
use async_trait::async_trait;
use serde_json::Value;

const ARGS: &[&str] = &["--approval-mode", "yolo", "--output-format", "stream-json"];
const TEXT_KEYS: &[&str] = &["text", "content", "result", "message"];

#[derive(Debug, Clone)]
pub struct GeminiAgent {
    program: String,
}

impl Default for GeminiAgent {
    fn default() -> Self {
        Self::new("gemini")
    }
}

impl GeminiAgent {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl Agent for GeminiAgent {
    fn agent_type(&self) -> &str {
        "gemini"
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
        let kind = event_type(&event);
        if kind == "result" {
            let result = text_of(event.get("result"), TEXT_KEYS);
            if !result.is_empty() {
                return Some(result);
            }
        }
        transcript.push(&message_text(kind, &event));
    }
    transcript.finish()
}

fn is_assistant(value: &Value) -> bool {
    matches!(value.get("role").and_then(Value::as_str), None | Some("") | Some("assistant"))
}

fn message_text(kind: &str, event: &Value) -> String {
    let nested = || {
        event
            .get("message")
            .filter(|m| m.is_object() && is_assistant(m))
            .map(|m| text_of(m.get("content"), TEXT_KEYS))
            .unwrap_or_default()
    };
    match kind {
        "message" if is_assistant(event) => {
            let content = text_of(event.get("content"), TEXT_KEYS);
            if content.is_empty() {
                nested()
            } else {
                content
            }
        }
        "assistant" => nested(),
        _ => String::new(),
    }
}

#[cfg(test)]
#[path = "gemini_tests.rs"]
mod tests;
