//! Runner configuration
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Config file (TOML, optional, every key optional)
//! 3. Environment variables: `RUNGUARD_*`
//! 4. CLI flags
//!
//! # Example Config
//!
//! ```toml
//! lock_dir = "/var/run/myapp"
//! color = "never"
//! log_on_stop = true
//! report_path = "/var/log/myapp/profile.jsonl"
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use crate::error::{Error, Result};
use crate::output::ColorMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Directory name, under the system temp dir, holding lock files by default.
const DEFAULT_LOCK_DIR_NAME: &str = "runguard";

pub const ENV_LOCK_DIR: &str = "RUNGUARD_LOCK_DIR";
pub const ENV_COLOR: &str = "RUNGUARD_COLOR";
pub const ENV_LOG_ON_STOP: &str = "RUNGUARD_LOG_ON_STOP";
pub const ENV_REPORT_PATH: &str = "RUNGUARD_REPORT_PATH";

/// Settings shared by every command run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Directory for lock files
    lock_dir: PathBuf,

    /// When to colorize console output
    color: ColorMode,

    /// Send the profiling summary to the log as well as the console
    log_on_stop: bool,

    /// Append every profiling result to this JSON lines file
    report_path: Option<PathBuf>,
}

/// Config file contents; absent keys keep the lower layer's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    lock_dir: Option<PathBuf>,
    color: Option<ColorMode>,
    log_on_stop: Option<bool>,
    report_path: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lock_dir: std::env::temp_dir().join(DEFAULT_LOCK_DIR_NAME),
            color: ColorMode::Auto,
            log_on_stop: true,
            report_path: None,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from all sources.
    ///
    /// `path` is an optional TOML file; a missing file is an error only
    /// when it was given explicitly.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The config file cannot be read or is malformed TOML
    /// - An environment variable holds an invalid value
    /// - The result fails validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`RunnerConfig::load`] with an injectable environment lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RunnerConfig::load`].
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = path {
            config.merge(load_toml_file(path)?);
        }

        config.apply_env_vars(env)?;
        config.validate()?;

        Ok(config)
    }

    #[must_use]
    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    #[must_use]
    pub const fn color(&self) -> ColorMode {
        self.color
    }

    #[must_use]
    pub const fn log_on_stop(&self) -> bool {
        self.log_on_stop
    }

    #[must_use]
    pub fn report_path(&self) -> Option<&Path> {
        self.report_path.as_deref()
    }

    #[must_use]
    pub fn with_lock_dir(mut self, dir: PathBuf) -> Self {
        self.lock_dir = dir;
        self
    }

    #[must_use]
    pub const fn with_color(mut self, color: ColorMode) -> Self {
        self.color = color;
        self
    }

    #[must_use]
    pub const fn with_log_on_stop(mut self, log_on_stop: bool) -> Self {
        self.log_on_stop = log_on_stop;
        self
    }

    #[must_use]
    pub fn with_report_path(mut self, path: PathBuf) -> Self {
        self.report_path = Some(path);
        self
    }

    fn merge(&mut self, other: PartialConfig) {
        if let Some(lock_dir) = other.lock_dir {
            self.lock_dir = lock_dir;
        }
        if let Some(color) = other.color {
            self.color = color;
        }
        if let Some(log_on_stop) = other.log_on_stop {
            self.log_on_stop = log_on_stop;
        }
        if other.report_path.is_some() {
            self.report_path = other.report_path;
        }
    }

    fn apply_env_vars<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env(ENV_LOCK_DIR) {
            self.lock_dir = PathBuf::from(value);
        }

        if let Some(value) = env(ENV_COLOR) {
            self.color = value
                .parse()
                .map_err(|e| Error::InvalidConfig(format!("Invalid {ENV_COLOR} value: {e}")))?;
        }

        if let Some(value) = env(ENV_LOG_ON_STOP) {
            self.log_on_stop = value.parse().map_err(|e| {
                Error::InvalidConfig(format!("Invalid {ENV_LOG_ON_STOP} value: {e}"))
            })?;
        }

        if let Some(value) = env(ENV_REPORT_PATH) {
            self.report_path = Some(PathBuf::from(value));
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.lock_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("lock_dir cannot be empty".to_string()));
        }

        if self
            .report_path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return Err(Error::InvalidConfig(
                "report_path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn load_toml_file(path: &Path) -> Result<PartialConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfig(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    toml::from_str(&content).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn toml_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::load_with_env(None, no_env).unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert!(config.lock_dir().ends_with("runguard"));
        assert_eq!(config.color(), ColorMode::Auto);
        assert!(config.log_on_stop());
        assert!(config.report_path().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = toml_file("color = \"never\"\n");
        let config = RunnerConfig::load_with_env(Some(file.path()), no_env).unwrap();
        assert_eq!(config.color(), ColorMode::Never);
        assert!(config.log_on_stop());
        assert_eq!(config.lock_dir(), RunnerConfig::default().lock_dir());
    }

    #[test]
    fn test_full_file() {
        let file = toml_file(
            "lock_dir = \"/tmp/locks\"\ncolor = \"always\"\nlog_on_stop = false\nreport_path = \"/tmp/profile.jsonl\"\n",
        );
        let config = RunnerConfig::load_with_env(Some(file.path()), no_env).unwrap();
        assert_eq!(config.lock_dir(), Path::new("/tmp/locks"));
        assert_eq!(config.color(), ColorMode::Always);
        assert!(!config.log_on_stop());
        assert_eq!(config.report_path(), Some(Path::new("/tmp/profile.jsonl")));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = toml_file("color = \"never\"\nlock_dir = \"/tmp/from-file\"\n");
        let env = env_from(&[
            (ENV_COLOR, "always"),
            (ENV_LOCK_DIR, "/tmp/from-env"),
            (ENV_LOG_ON_STOP, "false"),
            (ENV_REPORT_PATH, "/tmp/env.jsonl"),
        ]);

        let config = RunnerConfig::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(config.color(), ColorMode::Always);
        assert_eq!(config.lock_dir(), Path::new("/tmp/from-env"));
        assert!(!config.log_on_stop());
        assert_eq!(config.report_path(), Some(Path::new("/tmp/env.jsonl")));
    }

    #[test]
    fn test_invalid_env_values() {
        let result = RunnerConfig::load_with_env(None, env_from(&[(ENV_COLOR, "rainbow")]));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = RunnerConfig::load_with_env(None, env_from(&[(ENV_LOG_ON_STOP, "yes")]));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_paths_fail_validation() {
        let result = RunnerConfig::load_with_env(None, env_from(&[(ENV_LOCK_DIR, "")]));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = RunnerConfig::load_with_env(None, env_from(&[(ENV_REPORT_PATH, "")]));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_toml_returns_parse_error() {
        let file = toml_file("color = [unclosed");
        let result = RunnerConfig::load_with_env(Some(file.path()), no_env);
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let file = toml_file("colour = \"never\"\n");
        let result = RunnerConfig::load_with_env(Some(file.path()), no_env);
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result =
            RunnerConfig::load_with_env(Some(Path::new("/nonexistent/runguard.toml")), no_env);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_builders() {
        let config = RunnerConfig::default()
            .with_lock_dir(PathBuf::from("/tmp/x"))
            .with_color(ColorMode::Never)
            .with_log_on_stop(false)
            .with_report_path(PathBuf::from("/tmp/r.jsonl"));
        assert_eq!(config.lock_dir(), Path::new("/tmp/x"));
        assert_eq!(config.color(), ColorMode::Never);
        assert!(!config.log_on_stop());
        assert_eq!(config.report_path(), Some(Path::new("/tmp/r.jsonl")));
    }
}
