//! Optimisation sessions: per-hash state machines, their shared registry and
//! the reconciliation of reported history.

mod dataset;
mod handler;
mod registry;

pub use self::dataset::{DatasetBuilder, DatasetError, MergeKind};
pub use self::handler::{InitError, MAX_BATCH_SIZE, SessionError, SessionHandler, SharedSession};
pub use self::registry::{EvictionPolicy, IdleTimeout, NeverEvict, SessionRegistry};

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");
