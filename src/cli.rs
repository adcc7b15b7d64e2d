//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use clap::{Parser, Subcommand};
use runguard::output::ColorMode;
use std::path::PathBuf;

/// runguard - run commands one at a time, with a profile of every run
#[derive(Parser, Debug)]
#[command(name = "runguard")]
#[command(version)]
#[command(about = "Run a command under an exclusive lock and report time and memory spent")]
#[command(
    long_about = "runguard takes a lock named after the command, runs it, and prints when it started, how long it took and its peak memory. A second concurrent run of the same command prints a notice and exits with 0."
)]
pub struct Cli {
    /// Config file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// When to colorize output
    #[arg(long, value_enum, global = true)]
    pub color: Option<ColorMode>,

    /// Directory for lock files
    #[arg(long, global = true)]
    pub lock_dir: Option<PathBuf>,

    /// Append a JSON record of every run to this file
    #[arg(long, global = true)]
    pub report_file: Option<PathBuf>,

    /// Do not send the profiling summary to the log
    #[arg(long, default_value_t = false, global = true)]
    pub no_log: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an external program
    Exec {
        /// Lock/profile name (defaults to the program name)
        #[arg(short, long)]
        name: Option<String>,

        /// Program to run
        program: String,

        /// Arguments for the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Sleep for a while, holding the lock
    Sleep {
        /// Milliseconds to sleep
        #[arg(default_value_t = 1000)]
        millis: u64,

        /// Lock/profile name
        #[arg(short, long, default_value = "runguard:sleep")]
        name: String,

        /// Fail with an error after sleeping
        #[arg(long, default_value_t = false)]
        fail: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_keeps_hyphenated_args() {
        let cli = Cli::try_parse_from(["runguard", "exec", "--name", "app:ls", "ls", "-la", "/tmp"]);
        assert!(matches!(
            cli,
            Ok(Cli {
                command: Commands::Exec { ref name, ref program, ref args },
                ..
            }) if name.as_deref() == Some("app:ls") && program == "ls" && args == &["-la", "/tmp"]
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["runguard", "sleep", "5", "--color", "never", "--no-log"]);
        assert!(cli.is_ok_and(|cli| cli.color == Some(ColorMode::Never)
            && cli.no_log
            && matches!(cli.command, Commands::Sleep { millis: 5, .. })));
    }
}
