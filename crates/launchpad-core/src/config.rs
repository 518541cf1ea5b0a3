//! Runner configuration loaded from YAML.
//!
//! ```yaml
//! pty:
//!   poll_interval_ms: 50
//!   idle_flush_ticks: 2
//! stop_grace_ms: 2000
//! kill_grace_ms: 1000
//! log_filter: launchpad=debug
//! ```
//!
//! Every field is optional; missing ones take their defaults.

use std::path::Path;
use std::time::Duration;

use launchpad_pty::PtyConfig;
use serde::Deserialize;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML was malformed or had the wrong shape.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value was out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration of a runner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Settings for each PTY session.
    pub pty: PtyConfig,
    /// How long to wait for a stopped session to exit before killing it.
    pub stop_grace_ms: u64,
    /// How long to wait for a killed session to be reaped.
    pub kill_grace_ms: u64,
    /// Default `tracing` filter, overridden by `RUST_LOG`.
    pub log_filter: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pty: PtyConfig::default(),
            stop_grace_ms: 2000,
            kill_grace_ms: 1000,
            log_filter: "info".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Parses and validates a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML and
    /// [`ConfigError::Invalid`] for values a session cannot run with.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document means "all defaults".
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// errors of [`RunnerConfig::parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pty.validate().map_err(ConfigError::Invalid)?;
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}
