//! Integration tests for lockable, profiled command runs.
//!
//! These tests verify that:
//! - A run whose lock is taken prints a notice, exits 0 and profiles nothing
//! - The profile is written even when the command body fails
//! - Exit codes and run records reach the caller

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use runguard::lock::{FileLockProvider, InMemoryLockProvider, LockProvider};
use runguard::logging::MemorySink;
use runguard::memory::{FixedProbe, MemoryProbe};
use runguard::output::BufferedOutput;
use runguard::report_log::ReportLog;
use runguard::{
    ALREADY_RUNNING_MESSAGE, Command, CommandIo, CommandRunner, EXIT_CODE_OK, Error, Result,
};
use tempfile::TempDir;

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Counts how often the profiler samples memory.
#[derive(Default)]
struct CountingProbe {
    calls: AtomicUsize,
}

impl MemoryProbe for CountingProbe {
    fn peak_bytes(&self) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(4096)
    }
}

/// Finishes with a fixed exit code, or fails when `code` is `None`.
struct Scripted {
    name: &'static str,
    code: Option<i32>,
}

impl Command for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&mut self, io: &mut CommandIo<'_>) -> Result<i32> {
        io.info("working on %s", &[self.name.into()])?;
        self.code
            .ok_or_else(|| anyhow!("{} blew up", self.name).into())
    }
}

fn scripted(name: &'static str, code: Option<i32>) -> Scripted {
    Scripted { name, code }
}

/// A second run while the lock is held does nothing but print a notice.
///
/// # GIVEN
/// A lock provider where `app:import` is already held
///
/// # WHEN
/// The runner runs `app:import`
///
/// # THEN
/// Only the notice is printed, the exit code is 0, and no profiler ran
#[test]
fn test_already_running_skips_body_and_profiler() -> TestResult {
    let locks = InMemoryLockProvider::new();
    let held = locks.try_acquire("app:import")?.ok_or("lock should be free")?;

    let probe = Arc::new(CountingProbe::default());
    let sink = Arc::new(MemorySink::new());
    let mut runner = CommandRunner::new(locks.clone(), BufferedOutput::new())
        .with_memory_probe(probe.clone())
        .with_log_sink(sink.clone());

    let code = runner.run(&mut scripted("app:import", Some(7)))?;

    assert_eq!(code, EXIT_CODE_OK);
    assert_eq!(runner.output().lines(), [ALREADY_RUNNING_MESSAGE]);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    assert!(sink.messages().is_empty());

    drop(held);
    assert!(!locks.is_held("app:import"));
    Ok(())
}

/// A failing body still produces its profile before the error surfaces.
///
/// # GIVEN
/// A command whose body returns an error
///
/// # WHEN
/// It is run
///
/// # THEN
/// The profile is printed and logged, the lock is released, and the
/// command's error is returned
#[test]
fn test_failing_body_reports_then_propagates() -> TestResult {
    let locks = InMemoryLockProvider::new();
    let sink = Arc::new(MemorySink::new());
    let mut runner = CommandRunner::new(locks.clone(), BufferedOutput::new())
        .with_memory_probe(Arc::new(FixedProbe(2048)))
        .with_log_sink(sink.clone());

    let result = runner.run(&mut scripted("app:broken", None));

    assert!(matches!(&result, Err(Error::Command(e)) if e.to_string() == "app:broken blew up"));
    let lines = runner.output().lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "<info>working on app:broken</info>");
    assert!(lines[1].starts_with("<info>Task finished at: "));
    assert!(lines[1].ends_with("Memory used: 2 KB.</info>"));

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Memory used: 2 KB."));
    assert!(!locks.is_held("app:broken"));
    Ok(())
}

/// The body's exit code is what the runner returns.
#[test]
fn test_exit_code_passes_through() -> TestResult {
    let mut runner = CommandRunner::new(InMemoryLockProvider::new(), BufferedOutput::new())
        .with_memory_probe(Arc::new(FixedProbe(0)));

    assert_eq!(runner.run(&mut scripted("app:partial", Some(3)))?, 3);
    assert_eq!(runner.run(&mut scripted("app:partial", Some(0)))?, 0);
    Ok(())
}

/// Sequential runs of the same command each take the lock.
#[test]
fn test_lock_is_released_between_runs() -> TestResult {
    let dir = TempDir::new()?;
    let mut runner = CommandRunner::new(FileLockProvider::new(dir.path()), BufferedOutput::new())
        .with_memory_probe(Arc::new(FixedProbe(0)));

    runner.run(&mut scripted("app:nightly", Some(0)))?;
    runner.run(&mut scripted("app:nightly", Some(0)))?;

    let lines = runner.output().lines();
    assert!(!lines.iter().any(|line| line == ALREADY_RUNNING_MESSAGE));
    assert_eq!(
        lines
            .iter()
            .filter(|line| line.starts_with("<info>Task finished at: "))
            .count(),
        2
    );
    Ok(())
}

/// Two providers on one directory see each other's locks, like two
/// processes would.
///
/// # GIVEN
/// A lock file for `app:sync` taken through one provider
///
/// # WHEN
/// A runner using a second provider on the same directory runs `app:sync`
///
/// # THEN
/// It reports the command as already running; other scopes are unaffected
#[test]
fn test_file_lock_contention_across_providers() -> TestResult {
    let dir = TempDir::new()?;
    let other_process = FileLockProvider::new(dir.path());
    let held = other_process
        .try_acquire("app:sync")?
        .ok_or("lock should be free")?;

    let mut runner = CommandRunner::new(FileLockProvider::new(dir.path()), BufferedOutput::new())
        .with_memory_probe(Arc::new(FixedProbe(0)));

    assert_eq!(runner.run(&mut scripted("app:sync", Some(5)))?, EXIT_CODE_OK);
    assert_eq!(runner.run(&mut scripted("app:other", Some(5)))?, 5);
    assert_eq!(runner.output().lines()[0], ALREADY_RUNNING_MESSAGE);

    held.release()?;
    assert_eq!(runner.run(&mut scripted("app:sync", Some(5)))?, 5);
    Ok(())
}

/// Every completed or failed run is appended to the report log.
#[test]
fn test_report_log_records_each_run() -> TestResult {
    let dir = TempDir::new()?;
    let report = ReportLog::new(dir.path().join("runs.jsonl"));
    let mut runner = CommandRunner::new(InMemoryLockProvider::new(), BufferedOutput::new())
        .with_memory_probe(Arc::new(FixedProbe(1024)))
        .with_report_log(report.clone());

    runner.run(&mut scripted("app:first", Some(0)))?;
    let _ = runner.run(&mut scripted("app:second", None));

    let records = report.read_all()?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].task(), "app:first");
    assert_eq!(records[0].exit_code(), Some(0));
    assert_eq!(records[0].peak_memory_bytes(), 1024);
    assert_eq!(records[1].task(), "app:second");
    assert_eq!(records[1].exit_code(), None);
    Ok(())
}

/// An unwritable report log never fails the run.
#[test]
fn test_report_log_failure_is_not_fatal() -> TestResult {
    let dir = TempDir::new()?;
    let report = ReportLog::new(dir.path().join("missing").join("runs.jsonl"));
    let mut runner = CommandRunner::new(InMemoryLockProvider::new(), BufferedOutput::new())
        .with_memory_probe(Arc::new(FixedProbe(0)))
        .with_report_log(report);

    assert_eq!(runner.run(&mut scripted("app:quiet", Some(0)))?, 0);
    Ok(())
}
