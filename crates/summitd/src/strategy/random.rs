use rand::rngs::StdRng;
use serde_json::{Map, Value, json};

use summit_protocol::ParameterRow;

use crate::domain::{Domain, ObservationRow, Variable};

use super::sample::uniform;
use super::tuning::{TuningReader, rng_from};
use super::{Strategy, StrategyError};

const NAME: &str = "RandomSearch";

/// Uniform sampling within the parameter bounds.
#[derive(Debug)]
pub struct RandomSearch {
    parameters: Vec<Variable>,
    seed: Option<u64>,
    rng: StdRng,
    domain: Value,
}

impl RandomSearch {
    /// Builds the strategy from its tuning keys (`seed`).
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::InvalidTuning`] for unknown or malformed keys.
    pub fn configure(domain: &Domain, tuning: &Map<String, Value>) -> Result<Self, StrategyError> {
        let mut reader = TuningReader::new(NAME, tuning);
        let seed = reader.seed()?;
        reader.finish()?;
        Ok(Self {
            parameters: domain.parameters().cloned().collect(),
            seed,
            rng: rng_from(seed),
            domain: domain.describe(),
        })
    }
}

impl Strategy for RandomSearch {
    fn name(&self) -> &'static str {
        NAME
    }

    fn accepts_history(&self) -> bool {
        false
    }

    fn suggest(
        &mut self,
        _batch_size: usize,
        _observations: &[ObservationRow],
    ) -> Result<Vec<ParameterRow>, StrategyError> {
        Err(StrategyError::history_unsupported(NAME))
    }

    fn suggest_next(&mut self) -> Result<ParameterRow, StrategyError> {
        self.parameters
            .iter()
            .map(|variable| {
                let (low, high) = variable.bounds();
                uniform(&mut self.rng, NAME, low, high)
                    .map(|value| (variable.name().to_owned(), value))
            })
            .collect()
    }

    fn describe(&self) -> Value {
        json!({
            "name": NAME,
            "seed": self.seed,
            "domain": self.domain,
        })
    }
}
