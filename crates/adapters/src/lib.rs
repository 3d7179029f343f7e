// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-adapters: agent backends and OS process-group control

pub mod agent;
pub mod process;

pub use agent::{
    Agent, AgentError, AgentRegistry, ClaudeAgent, CodexAgent, CommandAgent, GeminiAgent,
    RunContext,
};
pub use process::{
    is_group_alive, kill_process_group, spawn_agent, terminate_process_group, AgentProcess,
    CommandSpec, ProcessError,
};
