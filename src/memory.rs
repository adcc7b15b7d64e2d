//! Peak memory sampling and byte formatting

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Units used by [`format_bytes`], in binary-prefix order.
const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Decimal places kept when scaling a byte count.
const PRECISION: i32 = 3;

/// Source of the process peak memory figure sampled when a profiler stops.
pub trait MemoryProbe {
    /// Peak memory usage of the current process, in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metrics`] if the figure cannot be obtained.
    fn peak_bytes(&self) -> Result<u64>;
}

/// Reads `VmHWM` (peak resident set size) from `/proc/self/status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcStatusProbe;

impl MemoryProbe for ProcStatusProbe {
    fn peak_bytes(&self) -> Result<u64> {
        ProcessMemory::read_from_file(Path::new("/proc/self/status"))
            .map(|memory| memory.peak_rss_kb().saturating_mul(1024))
    }
}

/// Probe returning a constant figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedProbe(pub u64);

impl MemoryProbe for FixedProbe {
    fn peak_bytes(&self) -> Result<u64> {
        Ok(self.0)
    }
}

/// Metric field types from /proc status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricType {
    VmRss,
    VmHwm,
}

/// Resident memory figures from a `/proc/[pid]/status` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessMemory {
    /// Current RSS in kilobytes
    rss_kb: u64,

    /// Peak RSS (high water mark) in kilobytes
    peak_rss_kb: u64,
}

impl ProcessMemory {
    /// Current RSS in kilobytes
    #[must_use]
    pub const fn rss_kb(&self) -> u64 {
        self.rss_kb
    }

    /// Peak RSS in kilobytes
    #[must_use]
    pub const fn peak_rss_kb(&self) -> u64 {
        self.peak_rss_kb
    }

    /// Read memory figures from a status file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, `VmHWM` is missing,
    /// or a value cannot be parsed.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Metrics(format!("failed to open {}: {e}", path.display()))
        })?;

        let parsed = BufReader::new(file)
            .lines()
            .map(|line| line.map_err(|e| Error::Metrics(format!("failed to read line: {e}"))))
            .filter_map(|line| line.and_then(|l| Self::parse_status_line(&l)).transpose())
            .collect::<Result<Vec<_>>>()?;

        let find = |wanted: MetricType| {
            parsed
                .iter()
                .find(|(metric_type, _)| *metric_type == wanted)
                .map(|(_, value)| *value)
        };

        let peak_rss_kb =
            find(MetricType::VmHwm).ok_or_else(|| Error::Metrics("VmHWM not found".to_string()))?;

        // VmRSS is informational only
        let rss_kb = find(MetricType::VmRss).unwrap_or(peak_rss_kb);

        Ok(Self {
            rss_kb,
            peak_rss_kb,
        })
    }

    /// Parse a single status line. Format: "`FieldName`:    12345 kB"
    ///
    /// Returns `None` for fields that are not tracked.
    fn parse_status_line(line: &str) -> Result<Option<(MetricType, u64)>> {
        let Some(metric_type) = (if line.starts_with("VmRSS:") {
            Some(MetricType::VmRss)
        } else if line.starts_with("VmHWM:") {
            Some(MetricType::VmHwm)
        } else {
            None
        }) else {
            return Ok(None);
        };

        let value = line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| Error::Metrics(format!("missing value in line: {line}")))?
            .parse::<u64>()
            .map_err(|e| Error::Metrics(format!("failed to parse value in '{line}': {e}")))?;

        Ok(Some((metric_type, value)))
    }
}

/// Format a byte count with binary-prefix units, keeping up to three decimals.
///
/// ```
/// use runguard::memory::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    let mut unit_index = 0_usize;
    let mut divisor = 1_u64;
    while unit_index < UNITS.len() - 1 {
        match divisor.checked_mul(1024) {
            Some(next) if bytes >= next => {
                divisor = next;
                unit_index += 1;
            }
            _ => break,
        }
    }

    #[allow(clippy::cast_precision_loss)] // display only
    let scaled = bytes as f64 / divisor as f64;
    let unit = UNITS.get(unit_index).copied().unwrap_or("B");

    format!("{} {unit}", round_to(scaled, PRECISION))
}

/// Round half away from zero to `places` decimals.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}
