//! Single-shot profiler for one named task.
//!
//! A [`Profiler`] moves through `NotStarted -> Running -> Stopped` exactly
//! once. Metrics are only readable once stopped.
//!
//! ```
//! use runguard::memory::FixedProbe;
//! use runguard::profiler::Profiler;
//! use std::sync::Arc;
//!
//! # fn main() -> runguard::Result<()> {
//! let mut profiler = Profiler::new("app:import").with_memory_probe(Arc::new(FixedProbe(1536)));
//! profiler.start()?;
//! profiler.stop(false)?;
//! assert_eq!(profiler.pretty_memory_usage()?, "1.5 KB");
//! # Ok(())
//! # }
//! ```
//!
//! The "finished at" line of the report shows the wall-clock time the task
//! *started* (its origin), truncated to whole seconds.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use crate::error::{Error, Result};
use crate::logging::LogSink;
use crate::memory::{format_bytes, MemoryProbe, ProcStatusProbe};
use chrono::{DateTime, SubsecRound, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use ulid::Ulid;

/// RFC 822 date layout used in reports.
pub const DATE_FORMAT: &str = "%a, %d %b %y %H:%M:%S %z";

/// Prefix of generated task names.
const DEFAULT_NAME_PREFIX: &str = "profiler_";

/// Lifecycle of a profiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilerState {
    NotStarted,
    Running {
        started: Instant,
        origin: DateTime<Utc>,
    },
    Stopped(Measurement),
}

impl ProfilerState {
    const fn label(&self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Running { .. } => "running",
            Self::Stopped(_) => "stopped",
        }
    }
}

/// Figures captured when a profiler stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    task_name: String,
    origin: DateTime<Utc>,
    elapsed: Duration,
    peak_memory_bytes: u64,
}

impl Measurement {
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Wall-clock time the task started.
    #[must_use]
    pub const fn origin(&self) -> DateTime<Utc> {
        self.origin
    }

    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    #[must_use]
    pub const fn elapsed_millis(&self) -> u128 {
        self.elapsed.as_millis()
    }

    #[must_use]
    pub const fn peak_memory_bytes(&self) -> u64 {
        self.peak_memory_bytes
    }

    #[must_use]
    pub fn pretty_memory_usage(&self) -> String {
        format_bytes(self.peak_memory_bytes)
    }

    /// Origin truncated to whole seconds.
    #[must_use]
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.origin.trunc_subsecs(0)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Task finished at: {}",
            self.finished_at().format(DATE_FORMAT)
        )?;
        write!(
            f,
            "Time spent: {} ms. Memory used: {}.",
            self.elapsed_millis(),
            self.pretty_memory_usage()
        )
    }
}

/// Tracks elapsed time and peak memory for one task.
pub struct Profiler {
    task_name: String,
    state: ProfilerState,
    log_sink: Option<Arc<dyn LogSink>>,
    memory_probe: Arc<dyn MemoryProbe>,
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("task_name", &self.task_name)
            .field("state", &self.state)
            .field("has_log_sink", &self.log_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl Profiler {
    /// Create a profiler. An empty name gets a generated `profiler_<id>` name.
    #[must_use]
    pub fn new(task_name: impl Into<String>) -> Self {
        let task_name = task_name.into();
        let task_name = if task_name.is_empty() {
            format!("{DEFAULT_NAME_PREFIX}{}", Ulid::new().to_string().to_lowercase())
        } else {
            task_name
        };

        Self {
            task_name,
            state: ProfilerState::NotStarted,
            log_sink: None,
            memory_probe: Arc::new(ProcStatusProbe),
        }
    }

    /// Attach a sink that receives the report when stopping with logging on.
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
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    #[must_use]
    pub const fn state(&self) -> &ProfilerState {
        &self.state
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, ProfilerState::Running { .. })
    }

    /// Start timing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the profiler has never been started.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ProfilerState::NotStarted {
            return Err(self.invalid_state("start"));
        }

        self.state = ProfilerState::Running {
            started: Instant::now(),
            origin: Utc::now(),
        };
        debug!(task = %self.task_name, "profiler started");
        Ok(())
    }

    /// Stop timing and capture peak memory.
    ///
    /// With `log_on_stop` set and a log sink attached, the report is sent to
    /// the sink.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the profiler is running.
    pub fn stop(&mut self, log_on_stop: bool) -> Result<()> {
        let ProfilerState::Running { started, origin } = self.state else {
            return Err(self.invalid_state("stop"));
        };

        let elapsed = started.elapsed();
        let peak_memory_bytes = self.memory_probe.peak_bytes().unwrap_or_else(|e| {
            warn!(task = %self.task_name, error = %e, "could not sample peak memory");
            0
        });

        let measurement = Measurement {
            task_name: self.task_name.clone(),
            origin,
            elapsed,
            peak_memory_bytes,
        };
        debug!(
            task = %self.task_name,
            elapsed_ms = u64::try_from(measurement.elapsed_millis()).unwrap_or(u64::MAX),
            peak_memory_bytes,
            "profiler stopped"
        );

        if log_on_stop {
            if let Some(sink) = &self.log_sink {
                sink.info(&measurement.to_string());
            }
        }
        self.state = ProfilerState::Stopped(measurement);
        Ok(())
    }

    /// Start the profiler and return a guard that stops it on drop.
    ///
    /// # Errors
    ///
    /// Same as [`Profiler::start`].
    pub fn start_guarded(mut self) -> Result<ProfilerGuard> {
        self.start()?;
        Ok(ProfilerGuard {
            profiler: Some(self),
        })
    }

    /// Captured figures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] unless the profiler has been stopped.
    pub fn measurement(&self) -> Result<&Measurement> {
        match &self.state {
            ProfilerState::Stopped(measurement) => Ok(measurement),
            _ => Err(Error::NotReady),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::NotReady`] unless the profiler has been stopped.
    pub fn elapsed_time(&self) -> Result<Duration> {
        self.measurement().map(Measurement::elapsed)
    }

    /// Peak memory in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] unless the profiler has been stopped.
    pub fn peak_memory_usage(&self) -> Result<u64> {
        self.measurement().map(Measurement::peak_memory_bytes)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotReady`] unless the profiler has been stopped.
    pub fn pretty_memory_usage(&self) -> Result<String> {
        self.measurement().map(Measurement::pretty_memory_usage)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotReady`] unless the profiler has been stopped.
    pub fn finished_at(&self) -> Result<DateTime<Utc>> {
        self.measurement().map(Measurement::finished_at)
    }

    /// Two-line human readable summary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] unless the profiler has been stopped.
    pub fn report(&self) -> Result<String> {
        self.measurement().map(ToString::to_string)
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            task: self.task_name.clone(),
            operation,
            state: self.state.label(),
        }
    }
}

/// Running profiler that is stopped, with logging, if dropped early.
#[derive(Debug)]
pub struct ProfilerGuard {
    profiler: Option<Profiler>,
}

impl ProfilerGuard {
    /// Stop the profiler and hand it back.
    ///
    /// # Errors
    ///
    /// Same as [`Profiler::stop`].
    pub fn finish(mut self, log_on_stop: bool) -> Result<Profiler> {
        let mut profiler = self
            .profiler
            .take()
            .ok_or_else(|| Error::InvalidState {
                task: String::new(),
                operation: "finish",
                state: "released",
            })?;
        profiler.stop(log_on_stop)?;
        Ok(profiler)
    }

    #[must_use]
    pub fn task_name(&self) -> &str {
        self.profiler.as_ref().map_or("", Profiler::task_name)
    }
}

impl Drop for ProfilerGuard {
    fn drop(&mut self) {
        if let Some(profiler) = self.profiler.as_mut().filter(|p| p.is_running()) {
            warn!(task = %profiler.task_name, "profiler dropped while running, stopping");
            let _ = profiler.stop(true);
        }
    }
}
