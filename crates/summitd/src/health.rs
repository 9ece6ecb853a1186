//! Structured health reporting for daemon lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use summit_config::Config;
use summit_protocol::SessionHash;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener accepts connections.
    fn listener_ready(&self, addr: SocketAddr);

    /// Invoked when a request names a hash for the first time.
    fn session_created(&self, hash: &SessionHash);

    /// Invoked when a client closes its session.
    fn session_closed(&self, hash: &SessionHash);

    /// Invoked when the eviction policy discards an idle session.
    fn session_evicted(&self, hash: &SessionHash, idle: Duration);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_ready(&self, addr: SocketAddr) {
        (**self).listener_ready(addr);
    }

    fn session_created(&self, hash: &SessionHash) {
        (**self).session_created(hash);
    }

    fn session_closed(&self, hash: &SessionHash) {
        (**self).session_closed(hash);
    }

    fn session_evicted(&self, hash: &SessionHash, idle: Duration) {
        (**self).session_evicted(hash, idle);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            host = %config.host(),
            port = config.port(),
            workers = config.workers(),
            idle_timeout_secs = ?config.session_idle_timeout_secs,
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn listener_ready(&self, addr: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_ready",
            %addr,
            "accepting connections"
        );
    }

    fn session_created(&self, hash: &SessionHash) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_created",
            %hash,
            "session created"
        );
    }

    fn session_closed(&self, hash: &SessionHash) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_closed",
            %hash,
            "session closed by client"
        );
    }

    fn session_evicted(&self, hash: &SessionHash, idle: Duration) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_evicted",
            %hash,
            idle_secs = idle.as_secs(),
            "idle session evicted"
        );
    }
}
