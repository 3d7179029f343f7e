// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `conductord`: the run orchestration daemon.

use std::process::ExitCode;

use clap::Parser;
use conductor_daemon::{job, logging, Cli, Command, Config};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    if let Some(Command::Job(args)) = &cli.command {
        logging::init_console()?;
        let outcome = job::run(&cli, args).await?;
        return Ok(ExitCode::from(job::exit_status(outcome.exit_code)));
    }

    let config = Config::load(&cli)?;
    let _guard = logging::init(&config.log_dir)?;

    if let Err(e) = conductor_daemon::run(config).await {
        tracing::error!(error = %e, "daemon exited with error");
        return Err(e.into());
    }
    Ok(ExitCode::SUCCESS)
}
