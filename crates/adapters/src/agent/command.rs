// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-configured executors: any program plus fixed arguments.

use super::cli::spawn_cli;
use super::{Agent, AgentError, RunContext};
use crate::process::AgentProcess;
use async_trait::async_trait;

/// Runs an arbitrary program. Output is kept verbatim.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandAgent {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self { name: name.into(), program: program.into(), args }
    }

    /// `sh -c <script>` registered under `name`.
    pub fn shell(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(name, "sh", vec!["-c".to_string(), script.into()])
    }

    /// Parse `name=program[,arg...]`.
    pub fn parse(spec: &str) -> Option<Self> {
        let (name, command) = spec.split_once('=')?;
        let mut parts = command.split(',').map(str::trim);
        let program = parts.next().filter(|p| !p.is_empty())?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, program, parts.map(str::to_string).collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl Agent for CommandAgent {
    fn agent_type(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &RunContext) -> Result<AgentProcess, AgentError> {
        spawn_cli(&self.program, self.args.clone(), ctx)
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
