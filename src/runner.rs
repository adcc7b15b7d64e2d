//! Lockable, profiled command execution.
//!
//! A run:
//! 1. Takes the lock named after the command, or prints
//!    [`ALREADY_RUNNING_MESSAGE`] and returns [`EXIT_CODE_OK`]
//! 2. Starts a profiler named after the command
//! 3. Executes the command body
//! 4. Stops the profiler (logging the summary) whatever the body returned
//! 5. Writes the summary as an info line
//! 6. Returns the body's exit code or error
//!
//! A panicking body still gets steps 4 and 5, then the panic resumes.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::format::{vsprintf, FormatArg};
use crate::lock::{FileLockProvider, LockProvider};
use crate::logging::{LogSink, TracingSink};
use crate::memory::{MemoryProbe, ProcStatusProbe};
use crate::output::{ConsoleOutput, Output, Style};
use crate::profiler::{Measurement, Profiler};
use crate::report_log::{ReportLog, RunRecord};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const EXIT_CODE_OK: i32 = 0;
pub const EXIT_CODE_ERROR_GENERIC: i32 = 2;

/// Printed when the command's lock is held by another run.
pub const ALREADY_RUNNING_MESSAGE: &str = "The command is already running in another process.";

/// A command body run under a [`CommandRunner`].
pub trait Command {
    /// Name used for the lock scope and the profiler task.
    fn name(&self) -> &str;

    /// Run the command and return its exit code.
    ///
    /// # Errors
    ///
    /// Any error the command raises; it reaches the runner's caller after
    /// profiling has been reported.
    fn execute(&mut self, io: &mut CommandIo<'_>) -> Result<i32>;
}

/// Styled output helpers handed to a command body.
pub struct CommandIo<'a> {
    output: &'a mut dyn Output,
}

impl<'a> CommandIo<'a> {
    pub fn new(output: &'a mut dyn Output) -> Self {
        Self { output }
    }

    /// Format and write an `<info>` line.
    ///
    /// # Errors
    ///
    /// Returns error if formatting or writing fails.
    pub fn info(&mut self, format: &str, args: &[FormatArg]) -> Result<()> {
        self.styled(Style::Info, format, args)
    }

    /// Format and write a `<comment>` line.
    ///
    /// # Errors
    ///
    /// Returns error if formatting or writing fails.
    pub fn warning(&mut self, format: &str, args: &[FormatArg]) -> Result<()> {
        self.styled(Style::Comment, format, args)
    }

    /// Format and write an `<error>` line.
    ///
    /// # Errors
    ///
    /// Returns error if formatting or writing fails.
    pub fn error(&mut self, format: &str, args: &[FormatArg]) -> Result<()> {
        self.styled(Style::Error, format, args)
    }

    /// Write `message` wrapped in `style` tags, without formatting.
    ///
    /// # Errors
    ///
    /// Returns error if writing fails.
    pub fn writeln(&mut self, message: &str, style: Style) -> Result<()> {
        self.output.write_line(&style.wrap(message))
    }

    /// Write an untagged line.
    ///
    /// # Errors
    ///
    /// Returns error if writing fails.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.output.write_line(line)
    }

    fn styled(&mut self, style: Style, format: &str, args: &[FormatArg]) -> Result<()> {
        let message = vsprintf(format, args)?;
        self.writeln(&message, style)
    }
}

/// Runs commands one at a time under a lock with profiling.
pub struct CommandRunner<L: LockProvider, O: Output> {
    locks: L,
    output: O,
    log_sink: Option<Arc<dyn LogSink>>,
    memory_probe: Arc<dyn MemoryProbe>,
    report_log: Option<ReportLog>,
}

impl CommandRunner<FileLockProvider, ConsoleOutput> {
    /// File locks, stdout console and tracing log as configured.
    #[must_use]
    pub fn from_config(config: &RunnerConfig) -> Self {
        let mut runner = Self::new(
            FileLockProvider::new(config.lock_dir()),
            ConsoleOutput::stdout(config.color()),
        );
        if config.log_on_stop() {
            runner = runner.with_log_sink(Arc::new(TracingSink));
        }
        if let Some(path) = config.report_path() {
            runner = runner.with_report_log(ReportLog::new(path));
        }
        runner
    }
}

impl<L: LockProvider, O: Output> CommandRunner<L, O> {
    pub fn new(locks: L, output: O) -> Self {
        Self {
            locks,
            output,
            log_sink: None,
            memory_probe: Arc::new(ProcStatusProbe),
            report_log: None,
        }
    }

    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory_probe = probe;
        self
    }

    #[must_use]
    pub fn with_report_log(mut self, report_log: ReportLog) -> Self {
        self.report_log = Some(report_log);
        self
    }

    pub const fn output(&self) -> &O {
        &self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }

    /// Output helpers outside of a run.
    pub fn io(&mut self) -> CommandIo<'_> {
        CommandIo::new(&mut self.output)
    }

    /// Run `command` once.
    ///
    /// # Errors
    ///
    /// Returns the command's own error once its profile has been written,
    /// or an error from locking, profiling or writing output.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from the command body once its profile has been
    /// written and its lock released.
    pub fn run(&mut self, command: &mut dyn Command) -> Result<i32> {
        let name = command.name().to_string();

        let Some(lock) = self.locks.try_acquire(&name)? else {
            info!(command = %name, "command already running, skipping");
            self.output.write_line(ALREADY_RUNNING_MESSAGE)?;
            return Ok(EXIT_CODE_OK);
        };

        let mut profiler =
            Profiler::new(name.as_str()).with_memory_probe(Arc::clone(&self.memory_probe));
        if let Some(sink) = &self.log_sink {
            profiler = profiler.with_log_sink(Arc::clone(sink));
        }

        debug!(command = %name, "running command");
        let guard = profiler.start_guarded()?;
        let executed = panic::catch_unwind(AssertUnwindSafe(|| {
            command.execute(&mut CommandIo::new(&mut self.output))
        }));
        let profiler = guard.finish(true)?;
        let measurement = profiler.measurement()?;

        let outcome = match executed {
            Ok(outcome) => outcome,
            Err(payload) => {
                warn!(command = %name, "command panicked");
                self.record(measurement, None);
                let _ = self.io().info("%s", &[measurement.to_string().into()]);
                drop(lock);
                panic::resume_unwind(payload);
            }
        };

        if let Err(e) = &outcome {
            warn!(command = %name, error = %e, "command failed");
        }

        self.record(measurement, outcome.as_ref().ok().copied());
        let reported = self.io().info("%s", &[measurement.to_string().into()]);
        drop(lock);

        outcome.and_then(|code| reported.map(|()| code))
    }

    /// Append to the report log, if any. Failures only warn.
    fn record(&self, measurement: &Measurement, exit_code: Option<i32>) {
        let Some(report_log) = &self.report_log else {
            return;
        };

        let record = RunRecord::from_measurement(measurement, exit_code);
        if let Err(e) = report_log.append(&record) {
            warn!(
                task = %record.task(),
                path = %report_log.path().display(),
                error = %e,
                "failed to append run record"
            );
        }
    }
}
