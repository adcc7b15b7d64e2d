//! External processes as command bodies

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use crate::error::{Error, Result};
use crate::runner::{Command, CommandIo, EXIT_CODE_ERROR_GENERIC};
use std::path::PathBuf;
use std::process::Command as ProcessCommand;
use tracing::debug;

/// Runs a program to completion and reports its exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    /// Lock and profiler name
    name: String,

    /// Program to run
    program: String,

    /// Arguments for the program
    args: Vec<String>,

    /// Working directory for the program
    working_dir: Option<PathBuf>,
}

impl ExecCommand {
    /// Create a command named after its program.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use runguard::process::ExecCommand;
    /// let command = ExecCommand::new("pg_dump", vec!["--format=custom".to_string()])
    ///     .with_name("backup:nightly");
    /// ```
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            name: program.clone(),
            program,
            args,
            working_dir: None,
        }
    }

    /// Set the lock/profiler name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the working directory for the program
    #[must_use]
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Command for ExecCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, io: &mut CommandIo<'_>) -> Result<i32> {
        let mut cmd = ProcessCommand::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(program = %self.program, args = ?self.args, "spawning");
        let status = cmd
            .status()
            .map_err(|e| Error::ProcessSpawnFailed(format!("failed to spawn {}: {e}", self.program)))?;

        // Killed by a signal: no exit code
        let code = status.code().unwrap_or(EXIT_CODE_ERROR_GENERIC);
        if !status.success() {
            io.warning("%s exited with code %d", &[self.program.as_str().into(), code.into()])?;
        }

        Ok(code)
    }
}
