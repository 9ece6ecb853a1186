//! Error types for listener and event loop operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding the listener or running the event loop.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host name resolution failed.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but produced no address.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the listening socket failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The readiness poller could not be created.
    #[error("failed to create readiness poller: {source}")]
    Poll {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The cross-thread waker could not be created.
    #[error("failed to create event loop waker: {source}")]
    Waker {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Worker threads could not be spawned.
    #[error("failed to start worker threads: {source}")]
    Workers {
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// Registering a socket with the poller failed.
    #[error("failed to register socket for readiness events: {source}")]
    Register {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Accepting a pending connection failed.
    #[error("failed to accept connection: {source}")]
    Accept {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Waiting for readiness failed.
    #[error("failed to wait for readiness events: {source}")]
    Wait {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The loop was asked to run before a listener was registered.
    #[error("event loop has no registered listener")]
    NotListening,
}
