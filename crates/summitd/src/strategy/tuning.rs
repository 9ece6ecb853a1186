//! Strict reading of algorithm tuning keys.

use std::collections::BTreeSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Map, Value};

use super::StrategyError;

/// Reads tuning keys by name and rejects any key left unread.
pub(super) struct TuningReader<'a> {
    algorithm: &'static str,
    tuning: &'a Map<String, Value>,
    consumed: BTreeSet<&'static str>,
}

impl<'a> TuningReader<'a> {
    pub(super) fn new(algorithm: &'static str, tuning: &'a Map<String, Value>) -> Self {
        Self {
            algorithm,
            tuning,
            consumed: BTreeSet::new(),
        }
    }

    /// Optional non-negative integer seed.
    pub(super) fn seed(&mut self) -> Result<Option<u64>, StrategyError> {
        self.take("seed")
            .map(|value| {
                value.as_u64().ok_or_else(|| {
                    StrategyError::invalid_tuning(
                        self.algorithm,
                        format!("seed must be a non-negative integer, got {value}"),
                    )
                })
            })
            .transpose()
    }

    /// Optional finite number.
    pub(super) fn number(&mut self, key: &'static str) -> Result<Option<f64>, StrategyError> {
        self.take(key)
            .map(|value| {
                value
                    .as_f64()
                    .filter(|number| number.is_finite())
                    .ok_or_else(|| {
                        StrategyError::invalid_tuning(
                            self.algorithm,
                            format!("{key} must be a finite number, got {value}"),
                        )
                    })
            })
            .transpose()
    }

    /// Fails when the declaration carries keys nobody read.
    pub(super) fn finish(self) -> Result<(), StrategyError> {
        let unknown: Vec<&str> = self
            .tuning
            .keys()
            .map(String::as_str)
            .filter(|key| !self.consumed.iter().any(|read| read == key))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(StrategyError::invalid_tuning(
                self.algorithm,
                format!("unsupported keys: {}", unknown.join(", ")),
            ))
        }
    }

    fn take(&mut self, key: &'static str) -> Option<&'a Value> {
        self.consumed.insert(key);
        self.tuning.get(key)
    }
}

/// Seeded generator when a seed was configured, OS-seeded otherwise.
pub(super) fn rng_from(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64)
}
