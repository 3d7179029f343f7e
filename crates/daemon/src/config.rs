// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: command-line flags, environment and the optional
//! agents file.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use conductor_adapters::{AgentRegistry, CommandAgent};
use conductor_storage::MessageLogOptions;
use serde::Deserialize;

use crate::env;
use crate::job::JobArgs;
use crate::lifecycle::LifecycleError;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "conductord")]
#[command(about = "Supervises agent runs and serves their live output")]
pub struct Cli {
    /// Storage root holding `<project>/<task>` directories.
    #[arg(long, env = "CONDUCTOR_ROOT")]
    pub root: Option<PathBuf>,
    #[arg(long, alias = "hostname", default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = 14355)]
    pub port: u16,
    /// Register a command agent, `name=program[,arg...]`. Repeatable.
    #[arg(long = "agent", value_name = "NAME=PROGRAM[,ARGS]")]
    pub agents: Vec<String>,
    /// TOML file with an `[agents.<name>]` table per extra backend.
    #[arg(long, env = "CONDUCTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Without a subcommand, serve until signalled.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one agent for a task in the foreground and exit with its code
    Job(JobArgs),
}

/// One `[agents.<name>]` entry of the agents file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AgentEntry {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    agents: BTreeMap<String, AgentEntry>,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage root (e.g. ~/.local/state/conductor/runs)
    pub root_dir: PathBuf,
    /// Directory for `conductord.log`
    pub log_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    pub listen_addr: SocketAddr,
    pub agents: AgentRegistry,
    pub log_options: MessageLogOptions,
    pub stream: StreamSettings,
    pub wait_timeout: Duration,
    pub max_restarts: u32,
}

/// Live stream timing and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub poll_interval: Duration,
    pub discovery_interval: Duration,
    pub heartbeat_interval: Duration,
    pub max_clients_per_run: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            discovery_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(30),
            max_clients_per_run: 10,
        }
    }
}

impl StreamSettings {
    pub fn from_env() -> Self {
        Self {
            poll_interval: env::stream_poll_interval(),
            discovery_interval: env::discovery_interval(),
            heartbeat_interval: env::heartbeat_interval(),
            max_clients_per_run: env::max_clients_per_run(),
        }
    }
}

impl Config {
    /// Resolve flags against the environment and the agents file.
    pub fn load(cli: &Cli) -> Result<Self, LifecycleError> {
        let root_dir = match &cli.root {
            Some(root) => root.clone(),
            None => env::root_dir()?,
        };
        let listen_addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse().map_err(|_| {
            LifecycleError::Config(format!("invalid listen address {}:{}", cli.host, cli.port))
        })?;

        Ok(Self {
            log_dir: env::log_dir().unwrap_or_else(|| root_dir.clone()),
            lock_path: root_dir.join("conductord.pid"),
            root_dir,
            listen_addr,
            agents: agent_registry(cli)?,
            log_options: env::message_log_options(),
            stream: StreamSettings::from_env(),
            wait_timeout: env::wait_timeout(),
            max_restarts: env::max_restarts(),
        })
    }

    /// Defaults rooted at `root_dir`, ignoring the environment.
    pub fn for_root(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        Self {
            log_dir: root_dir.clone(),
            lock_path: root_dir.join("conductord.pid"),
            root_dir,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            agents: AgentRegistry::with_defaults(),
            log_options: MessageLogOptions::default(),
            stream: StreamSettings::default(),
            wait_timeout: Duration::from_secs(300),
            max_restarts: 100,
        }
    }

    conductor_core::setters! {
        set {
            agents: AgentRegistry,
            stream: StreamSettings,
            wait_timeout: Duration,
            max_restarts: u32,
        }
    }
}

/// Built-in backends plus those from the agents file and `--agent` flags.
pub fn agent_registry(cli: &Cli) -> Result<AgentRegistry, LifecycleError> {
    let mut agents = AgentRegistry::with_defaults();
    if let Some(path) = &cli.config {
        for (name, entry) in load_agents_file(path)? {
            agents.register(Arc::new(CommandAgent::new(name, entry.program, entry.args)));
        }
    }
    for spec in &cli.agents {
        let agent = CommandAgent::parse(spec).ok_or_else(|| {
            LifecycleError::Config(format!(
                "invalid --agent {spec:?}, expected name=program[,arg...]"
            ))
        })?;
        agents.register(Arc::new(agent));
    }
    Ok(agents)
}

/// Parse the `[agents.<name>]` tables of a TOML config file.
pub fn load_agents_file(path: &Path) -> Result<BTreeMap<String, AgentEntry>, LifecycleError> {
    let text = std::fs::read_to_string(path)?;
    let file: ConfigFile = toml::from_str(&text)
        .map_err(|e| LifecycleError::Config(format!("{}: {e}", path.display())))?;
    for (name, entry) in &file.agents {
        if name.trim().is_empty() || entry.program.trim().is_empty() {
            return Err(LifecycleError::Config(format!(
                "{}: agent {name:?} needs a name and a program",
                path.display()
            )));
        }
    }
    Ok(file.agents)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
