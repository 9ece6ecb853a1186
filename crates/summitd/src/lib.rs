//! Optimisation-as-a-service daemon.
//!
//! Clients connect over TCP and drive long-lived optimisation sessions with
//! one JSON document per request. A session is identified by an opaque hash,
//! declares its search domain and optimiser once, then alternates between
//! reporting measured results and receiving the next batch of suggested
//! experiments.
//!
//! The crate is organised around a single-threaded readiness loop:
//!
//! * [`transport`] owns the listener and client sockets and performs exactly
//!   one bounded read per request;
//! * `dispatch` decodes requests, resolves sessions and hands optimiser work
//!   to a worker pool whose completions wake the loop;
//! * [`session`] holds the per-hash state machine, the observation table and
//!   the eviction policy;
//! * [`strategy`] adapts concrete optimisers behind a narrow trait.
//!
//! Bootstrap follows the usual sequence: configuration is loaded through
//! `ortho_config`, structured telemetry is installed, and lifecycle events are
//! emitted through a [`HealthReporter`].

mod bootstrap;
mod dispatch;
pub mod domain;
mod health;
mod process;
pub mod session;
pub mod strategy;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
