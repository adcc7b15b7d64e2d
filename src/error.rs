//! Error types for runguard.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use thiserror::Error;

/// Result type for runguard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while profiling, locking, or running a command.
#[derive(Error, Debug)]
pub enum Error {
    /// Profiler metrics were read before the profiler was stopped.
    #[error("In order to check for any data you must stop the profiler first.")]
    NotReady,

    /// `start()`/`stop()` called out of sequence.
    #[error("profiler '{task}' cannot {operation} while {state}")]
    InvalidState {
        task: String,
        operation: &'static str,
        state: &'static str,
    },

    /// Printf-style formatting failed.
    #[error("format error: {0}")]
    Format(String),

    /// Lock provider failed for a reason other than contention.
    #[error("lock error for '{scope}': {reason}")]
    Lock { scope: String, reason: String },

    /// Memory metrics could not be read.
    #[error("memory metrics unavailable: {0}")]
    Metrics(String),

    /// Configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// External process could not be started.
    #[error("failed to spawn process: {0}")]
    ProcessSpawnFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error.
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Error raised by a command body.
    #[error(transparent)]
    Command(#[from] anyhow::Error),
}

impl Error {
    /// Create a lock error.
    pub fn lock(scope: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lock {
            scope: scope.into(),
            reason: reason.into(),
        }
    }

    /// Returns the machine-readable error code for this error.
    ///
    /// Error codes are always in `SCREAMING_SNAKE_CASE` format.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotReady => "NOT_READY",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Format(_) => "FORMAT_ERROR",
            Self::Lock { .. } => "LOCK_ERROR",
            Self::Metrics(_) => "METRICS_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ProcessSpawnFailed(_) => "PROCESS_SPAWN_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) | Self::Toml(_) => "PARSE_ERROR",
            Self::Command(_) => "COMMAND_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_message() {
        assert_eq!(
            Error::NotReady.to_string(),
            "In order to check for any data you must stop the profiler first."
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = Error::InvalidState {
            task: "app:import".to_string(),
            operation: "stop",
            state: "not started",
        };
        assert_eq!(
            err.to_string(),
            "profiler 'app:import' cannot stop while not started"
        );
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[test]
    fn test_command_error_is_transparent() {
        let err = Error::from(anyhow::anyhow!("database unreachable"));
        assert_eq!(err.to_string(), "database unreachable");
        assert_eq!(err.code(), "COMMAND_ERROR");
    }
}
