//! Shared doubles and harnesses for the daemon test suites.

mod client;
mod config_loader;
mod reporter;
mod shutdown;
mod world;

pub use client::TestClient;
pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use shutdown::TestShutdownSignal;
pub use world::{TestWorld, world};
