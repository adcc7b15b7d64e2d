//! JSON lines history of profiled runs

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use crate::error::Result;
use crate::profiler::Measurement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One profiled command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Command (task) name
    task: String,

    /// When the run started
    started_at: DateTime<Utc>,

    /// Wall time spent in milliseconds
    elapsed_ms: u64,

    /// Peak resident memory in bytes
    peak_memory_bytes: u64,

    /// Exit code, absent when the command failed with an error
    exit_code: Option<i32>,
}

impl RunRecord {
    /// Build a record from a stopped profiler's measurement.
    #[must_use]
    pub fn from_measurement(measurement: &Measurement, exit_code: Option<i32>) -> Self {
        Self {
            task: measurement.task_name().to_string(),
            started_at: measurement.origin(),
            elapsed_ms: u64::try_from(measurement.elapsed_millis()).unwrap_or(u64::MAX),
            peak_memory_bytes: measurement.peak_memory_bytes(),
            exit_code,
        }
    }

    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub const fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    #[must_use]
    pub const fn peak_memory_bytes(&self) -> u64 {
        self.peak_memory_bytes
    }

    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

/// Appends run records to a file, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLog {
    path: PathBuf,
}

impl ReportLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written or serialization fails.
    pub fn append(&self, record: &RunRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{json}")?;
        Ok(())
    }

    /// Read all records; a missing file has none.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or a line is not valid JSON.
    pub fn read_all(&self) -> Result<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        BufReader::new(File::open(&self.path)?)
            .lines()
            .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(|line| -> Result<RunRecord> { Ok(serde_json::from_str(&line?)?) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::Error;
    use crate::memory::FixedProbe;
    use crate::profiler::Profiler;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn measurement(name: &str, bytes: u64) -> Measurement {
        let mut profiler = Profiler::new(name).with_memory_probe(Arc::new(FixedProbe(bytes)));
        profiler.start().unwrap();
        profiler.stop(false).unwrap();
        profiler.measurement().unwrap().clone()
    }

    #[test]
    fn test_record_from_measurement() {
        let m = measurement("app:sync", 2048);
        let record = RunRecord::from_measurement(&m, Some(0));
        assert_eq!(record.task(), "app:sync");
        assert_eq!(record.started_at(), m.origin());
        assert_eq!(record.peak_memory_bytes(), 2048);
        assert_eq!(record.exit_code(), Some(0));
    }

    #[test]
    fn test_append_accumulates_lines() {
        let dir = TempDir::new().unwrap();
        let log = ReportLog::new(dir.path().join("runs.jsonl"));
        assert!(log.read_all().unwrap().is_empty());

        log.append(&RunRecord::from_measurement(&measurement("a", 1), Some(0)))
            .unwrap();
        log.append(&RunRecord::from_measurement(&measurement("b", 2), None))
            .unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].task(), "a");
        assert_eq!(records[1].task(), "b");
        assert_eq!(records[1].exit_code(), None);

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("runs.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        let result = ReportLog::new(path).read_all();
        assert!(matches!(result, Err(Error::Json(_))));
    }
}
