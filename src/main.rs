//! # runguard
//!
//! Runs a command under an exclusive lock and prints a profile of the run.
//!
//! ## Exit codes
//!
//! - The command's own exit code when it completes
//! - `0` when another process already holds the command's lock
//! - `2` when configuration, locking or the command itself fails

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod commands;

use clap::Parser;
use runguard::config::RunnerConfig;
use runguard::logging::init_tracing;
use runguard::process::ExecCommand;
use runguard::{Command, CommandRunner, Result, EXIT_CODE_ERROR_GENERIC};
use tracing::error;

use crate::cli::{Cli, Commands};
use crate::commands::SleepCommand;

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let code = run(cli).unwrap_or_else(|e| {
        error!(code = e.code(), "{e}");
        EXIT_CODE_ERROR_GENERIC
    });

    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;
    let mut runner = CommandRunner::from_config(&config);

    let mut command: Box<dyn Command> = match cli.command {
        Commands::Exec {
            name,
            program,
            args,
        } => {
            let exec = ExecCommand::new(program, args);
            Box::new(match name {
                Some(name) => exec.with_name(name),
                None => exec,
            })
        }
        Commands::Sleep { millis, name, fail } => Box::new(SleepCommand::new(name, millis, fail)),
    };

    let result = runner.run(command.as_mut());
    if let Err(e) = &result {
        // The profile is already on screen; end with the failure itself
        let _ = runner.io().error("%s", &[e.to_string().into()]);
    }
    result
}

/// Defaults, then file and environment, then CLI flags.
fn load_config(cli: &Cli) -> Result<RunnerConfig> {
    let mut config = RunnerConfig::load(cli.config.as_deref())?;

    if let Some(color) = cli.color {
        config = config.with_color(color);
    }
    if let Some(dir) = &cli.lock_dir {
        config = config.with_lock_dir(dir.clone());
    }
    if let Some(path) = &cli.report_file {
        config = config.with_report_path(path.clone());
    }
    if cli.no_log {
        config = config.with_log_on_stop(false);
    }

    Ok(config)
}
