//! Test suites for the optimisation daemon.

mod lifecycle;
pub(crate) mod support;
