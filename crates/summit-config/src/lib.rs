//! Layered configuration for the Summit optimisation daemon.
//!
//! [`Config`] is assembled by `ortho_config` from, in increasing precedence,
//! built-in defaults, a `.summit.toml` configuration file, `SUMMIT_*`
//! environment variables and command-line flags (`--host`, `--port`,
//! `--workers`, ...). The daemon calls [`Config::validate`] once the layers
//! are merged.

mod defaults;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_SWEEP_INTERVAL_MS, DEFAULT_WORKERS,
    default_host, default_log_filter, default_log_filter_string, default_log_format,
    default_port, default_sweep_interval_ms, default_workers,
};

/// Log output format for the daemon's structured telemetry.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per event.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SUMMIT")]
pub struct Config {
    /// Host name or address the listener binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port the listener binds to. Port 0 picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Optimiser worker threads. Zero runs optimiser calls on the event loop.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Seconds of inactivity after which a session is evicted. Sessions live
    /// for the whole process when unset.
    #[serde(default)]
    pub session_idle_timeout_secs: Option<u64>,
    /// Milliseconds between idle-session sweeps.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            workers: DEFAULT_WORKERS,
            session_idle_timeout_secs: None,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            log_filter: default_log_filter_string(),
            log_format: LogFormat::default(),
        }
    }
}

/// Errors raised when merged configuration values are unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// The listen host was blank.
    #[error("listen host must not be empty")]
    EmptyHost,
    /// Idle eviction was requested with a zero timeout.
    #[error("session idle timeout must be at least one second")]
    ZeroIdleTimeout,
    /// Sweeps were configured to run continuously.
    #[error("sweep interval must be at least one millisecond")]
    ZeroSweepInterval,
}

impl Config {
    /// Host the listener binds to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the listener binds to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Number of optimiser worker threads.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Idle period after which sessions are evicted, if eviction is enabled.
    #[must_use]
    pub fn session_idle_timeout(&self) -> Option<Duration> {
        self.session_idle_timeout_secs.map(Duration::from_secs)
    }

    /// Interval between idle-session sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Selected log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Checks values that every layer accepts individually but the daemon
    /// cannot run with.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.host.trim().is_empty() {
            return Err(ConfigValidationError::EmptyHost);
        }
        if self.session_idle_timeout_secs == Some(0) {
            return Err(ConfigValidationError::ZeroIdleTimeout);
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigValidationError::ZeroSweepInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_match_the_published_endpoint() {
        let config = Config::default();
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 12111);
        assert_eq!(config.session_idle_timeout(), None);
        assert_eq!(config.validate(), Ok(()));
    }

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("Compact", LogFormat::Compact)]
    fn log_format_parses_case_insensitively(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().expect("parse format"), expected);
    }

    #[test]
    fn idle_timeout_converts_to_duration() {
        let config = Config {
            session_idle_timeout_secs: Some(90),
            ..Config::default()
        };
        assert_eq!(config.session_idle_timeout(), Some(Duration::from_secs(90)));
    }

    #[rstest]
    #[case(Config { host: "  ".to_owned(), ..Config::default() }, ConfigValidationError::EmptyHost)]
    #[case(Config { session_idle_timeout_secs: Some(0), ..Config::default() }, ConfigValidationError::ZeroIdleTimeout)]
    #[case(Config { sweep_interval_ms: 0, ..Config::default() }, ConfigValidationError::ZeroSweepInterval)]
    fn validation_rejects_unusable_values(
        #[case] config: Config,
        #[case] expected: ConfigValidationError,
    ) {
        assert_eq!(config.validate(), Err(expected));
    }
}
