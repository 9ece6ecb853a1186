//! Optimiser adapters.
//!
//! A [`Strategy`] proposes experiments inside a [`Domain`]. Sessions talk to
//! optimisers only through this trait, so new algorithms are added by
//! implementing it and registering a constructor with a [`StrategyFactory`].
//!
//! Strategies come in two flavours, distinguished by
//! [`Strategy::accepts_history`]:
//!
//! * history-aware strategies receive the full observation table on every
//!   call to [`Strategy::suggest`];
//! * sequential strategies learn incrementally through
//!   [`Strategy::observe`] and hand out one point per
//!   [`Strategy::suggest_next`] call.

mod hill_climb;
mod latin;
mod random;
mod sample;
mod tuning;

use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use summit_protocol::{AlgorithmConfig, ParameterRow};

use crate::domain::{Domain, ObservationRow};

pub use self::hill_climb::HillClimb;
pub use self::latin::LatinHypercube;
pub use self::random::RandomSearch;

/// Failures raised by optimiser construction or suggestion calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// No optimiser is registered under the requested name.
    #[error("unknown algorithm '{name}'")]
    UnknownAlgorithm {
        /// Requested name.
        name: String,
    },
    /// Tuning keys were missing, unknown or out of range.
    #[error("invalid tuning for {algorithm}: {message}")]
    InvalidTuning {
        /// Algorithm being configured.
        algorithm: String,
        /// Human-readable reason.
        message: String,
    },
    /// The optimiser cannot consume an observation table.
    #[error("{algorithm} does not accept observation history")]
    HistoryUnsupported {
        /// Algorithm that refused the call.
        algorithm: String,
    },
    /// The optimiser failed internally.
    #[error("{algorithm} failed: {message}")]
    Failed {
        /// Algorithm that failed.
        algorithm: String,
        /// Human-readable reason.
        message: String,
    },
    /// The optimiser returned no suggestions.
    #[error("{algorithm} returned an empty batch")]
    EmptyBatch {
        /// Algorithm that returned nothing.
        algorithm: String,
    },
    /// A suggestion omitted one of the domain's parameters.
    #[error("{algorithm} suggested a point without parameter '{name}'")]
    IncompleteSuggestion {
        /// Algorithm that produced the point.
        algorithm: String,
        /// Missing parameter.
        name: String,
    },
}

impl StrategyError {
    /// Builds an [`StrategyError::InvalidTuning`] error.
    pub fn invalid_tuning(algorithm: &str, message: impl Into<String>) -> Self {
        Self::InvalidTuning {
            algorithm: algorithm.to_owned(),
            message: message.into(),
        }
    }

    /// Builds a [`StrategyError::HistoryUnsupported`] error.
    #[must_use]
    pub fn history_unsupported(algorithm: &str) -> Self {
        Self::HistoryUnsupported {
            algorithm: algorithm.to_owned(),
        }
    }
}

/// Narrow interface every optimiser implements.
#[cfg_attr(test, mockall::automock)]
pub trait Strategy: Send {
    /// Registered algorithm name.
    fn name(&self) -> &'static str;

    /// Whether [`Strategy::suggest`] consumes the observation table.
    fn accepts_history(&self) -> bool;

    /// Proposes up to `batch_size` points given every observation so far.
    ///
    /// Returning fewer points than requested is allowed; the caller asks
    /// again until the batch is filled.
    ///
    /// # Errors
    ///
    /// Sequential strategies return [`StrategyError::HistoryUnsupported`].
    fn suggest(
        &mut self,
        batch_size: usize,
        observations: &[ObservationRow],
    ) -> Result<Vec<ParameterRow>, StrategyError>;

    /// Proposes a single point without consulting history.
    fn suggest_next(&mut self) -> Result<ParameterRow, StrategyError>;

    /// Feeds newly recorded observations to a sequential strategy.
    fn observe(&mut self, _rows: &[ObservationRow]) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Configuration snapshot returned to clients on initialisation.
    fn describe(&self) -> Value;
}

/// Builds strategies from algorithm declarations.
#[cfg_attr(test, mockall::automock)]
pub trait StrategyFactory: Send + Sync {
    /// Instantiates the algorithm described by `config` over `domain`.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::UnknownAlgorithm`] or
    /// [`StrategyError::InvalidTuning`] when the declaration is unusable.
    fn build(
        &self,
        domain: &Domain,
        config: &AlgorithmConfig,
    ) -> Result<Box<dyn Strategy>, StrategyError>;
}

/// Algorithms shipped with the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum AlgorithmKind {
    /// Uniform sampling.
    RandomSearch,
    /// Stratified space-filling batches.
    LatinHypercube,
    /// Local search around the best observation.
    HillClimb,
}

/// Factory for the built-in catalogue.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinStrategies;

impl StrategyFactory for BuiltinStrategies {
    fn build(
        &self,
        domain: &Domain,
        config: &AlgorithmConfig,
    ) -> Result<Box<dyn Strategy>, StrategyError> {
        let kind = config.name.trim().parse::<AlgorithmKind>().map_err(|_| {
            StrategyError::UnknownAlgorithm {
                name: config.name.clone(),
            }
        })?;
        let strategy: Box<dyn Strategy> = match kind {
            AlgorithmKind::RandomSearch => Box::new(RandomSearch::configure(domain, &config.tuning)?),
            AlgorithmKind::LatinHypercube => {
                Box::new(LatinHypercube::configure(domain, &config.tuning)?)
            }
            AlgorithmKind::HillClimb => Box::new(HillClimb::configure(domain, &config.tuning)?),
        };
        Ok(strategy)
    }
}
