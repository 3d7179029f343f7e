// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent backends
//!
//! Each backend knows how to start its executor for one run and how to pull
//! the final answer out of whatever the executor printed. The supervisor
//! only sees the [`Agent`] trait and picks a backend by `agent_type`
//! through the [`AgentRegistry`].

mod claude;
mod cli;
mod codex;
mod command;
mod gemini;
mod stream_json;

pub use claude::ClaudeAgent;
pub use codex::CodexAgent;
pub use command::CommandAgent;
pub use gemini::GeminiAgent;

use crate::process::{AgentProcess, ProcessError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors from agent backends
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("unknown agent type: {0}")]
    UnknownAgent(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Everything a backend needs to start one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub project_id: String,
    pub task_id: String,
    /// File whose contents are fed to the executor's stdin.
    pub prompt_path: PathBuf,
    pub working_dir: PathBuf,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    /// Extra variables layered over the daemon's environment.
    pub environment: Vec<(String, String)>,
}

/// One agent backend.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// Registry key, e.g. `"claude"`.
    fn agent_type(&self) -> &str;

    /// Start the executor for `ctx` and hand back the running process.
    async fn execute(&self, ctx: &RunContext) -> Result<AgentProcess, AgentError>;

    /// Extract the final answer from captured stdout.
    ///
    /// `None` means the output has no recognisable structure and callers
    /// should keep the raw text.
    fn normalize_output(&self, _stdout: &str) -> Option<String> {
        None
    }

    /// Best-effort executor version for run records.
    async fn version(&self) -> Option<String> {
        None
    }
}

/// Backends by agent type.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in CLI backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ClaudeAgent::default()));
        registry.register(Arc::new(CodexAgent::default()));
        registry.register(Arc::new(GeminiAgent::default()));
        registry
    }

    /// Add or replace the backend for its agent type.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let key = agent.agent_type().to_string();
        if self.agents.insert(key.clone(), agent).is_some() {
            tracing::debug!(agent_type = %key, "replaced agent backend");
        }
    }

    pub fn get(&self, agent_type: &str) -> Result<Arc<dyn Agent>, AgentError> {
        self.agents
            .get(agent_type.trim())
            .cloned()
            .ok_or_else(|| AgentError::UnknownAgent(agent_type.to_string()))
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.agents.contains_key(agent_type.trim())
    }

    /// Registered agent types, sorted.
    pub fn agent_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.agents.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry").field("agents", &self.agent_types()).finish()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
