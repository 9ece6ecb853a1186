//! Default values shared by the daemon binary and its tests.

/// Default host the daemon listens on.
pub const DEFAULT_HOST: &str = "localhost";

/// Default TCP port the daemon listens on.
pub const DEFAULT_PORT: u16 = 12111;

/// Default number of optimiser worker threads.
pub const DEFAULT_WORKERS: usize = 4;

/// Default interval between idle-session sweeps, in milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned default host, for serde.
pub fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// Default port, for serde.
pub fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Default worker count, for serde.
pub fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// Default sweep interval, for serde.
pub fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::LogFormat {
    crate::LogFormat::Json
}
