//! Process supervision: wiring the daemon together, serving until a
//! termination signal arrives and shutting down cleanly.

use std::io;
use std::sync::Arc;
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{info, warn};

use crate::bootstrap::{BootstrapError, ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::strategy::{BuiltinStrategies, StrategyFactory};
use crate::transport::{EventLoop, ListenerError, StopHandle, bind_tcp};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The listener or event loop failed.
    #[error("transport failure: {source}")]
    Transport {
        /// Underlying transport error.
        #[from]
        source: ListenerError,
    },
    /// Signal handling could not be installed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + 'static {
    /// Blocks until shutdown should proceed.
    fn wait(self) -> io::Result<()>;
}

/// Shutdown listener that waits for termination signals.
#[derive(Debug)]
pub struct SystemShutdownSignal {
    signals: Signals,
}

impl SystemShutdownSignal {
    /// Installs handlers for `SIGTERM`, `SIGINT`, `SIGQUIT` and `SIGHUP`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the handlers cannot be registered.
    pub fn install() -> io::Result<Self> {
        Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP]).map(|signals| Self { signals })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(mut self) -> io::Result<()> {
        if let Some(signal) = self.signals.forever().next() {
            info!(
                target: PROCESS_TARGET,
                signal,
                "shutdown signal received"
            );
        }
        Ok(())
    }
}

/// Runs the daemon using the production collaborators.
pub fn run_daemon() -> Result<(), LaunchError> {
    let shutdown =
        SystemShutdownSignal::install().map_err(|source| LaunchError::Signals { source })?;
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        Arc::new(BuiltinStrategies),
        shutdown,
    )
}

/// Runs the daemon with injected collaborators until `shutdown` fires or the
/// event loop fails.
pub fn run_daemon_with<S>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    factory: Arc<dyn StrategyFactory>,
    shutdown: S,
) -> Result<(), LaunchError>
where
    S: ShutdownSignal,
{
    let daemon = bootstrap_with(loader, reporter)?;
    let config = daemon.config();
    info!(
        target: PROCESS_TARGET,
        host = %config.host(),
        port = config.port(),
        workers = config.workers(),
        "starting daemon runtime"
    );

    let mut event_loop = EventLoop::new(daemon.session_registry(factory), config.workers())?;
    let addr = event_loop.register_listener(bind_tcp(config.host(), config.port())?)?;
    daemon.reporter().listener_ready(addr);

    spawn_shutdown_watcher(shutdown, event_loop.stop_handle());
    let outcome = event_loop.run();
    event_loop.stop();
    outcome?;
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}

fn spawn_shutdown_watcher<S>(shutdown: S, stop: StopHandle)
where
    S: ShutdownSignal,
{
    let spawned = thread::Builder::new()
        .name("summitd-shutdown".to_owned())
        .spawn(move || {
            if let Err(error) = shutdown.wait() {
                warn!(
                    target: PROCESS_TARGET,
                    error = %error,
                    "shutdown signal listener failed; stopping"
                );
            }
            if let Err(error) = stop.stop() {
                warn!(
                    target: PROCESS_TARGET,
                    error = %error,
                    "failed to wake event loop for shutdown"
                );
            }
        });
    if let Err(error) = spawned {
        warn!(
            target: PROCESS_TARGET,
            error = %error,
            "could not start shutdown watcher; signals will terminate the process"
        );
    }
}
