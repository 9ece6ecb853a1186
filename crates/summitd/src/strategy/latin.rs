use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::{Map, Value, json};

use summit_protocol::ParameterRow;

use crate::domain::{Domain, ObservationRow, Variable};

use super::tuning::{TuningReader, rng_from};
use super::{Strategy, StrategyError};

const NAME: &str = "LatinHypercube";

/// Space-filling batches: each parameter range is cut into one stratum per
/// requested point and every stratum is sampled exactly once.
///
/// Observations are accepted but do not influence the design.
#[derive(Debug)]
pub struct LatinHypercube {
    parameters: Vec<Variable>,
    seed: Option<u64>,
    rng: StdRng,
    domain: Value,
}

impl LatinHypercube {
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

    fn design(&mut self, points: usize) -> Vec<ParameterRow> {
        let mut rows = vec![ParameterRow::new(); points];
        let strata = u32::try_from(points).unwrap_or(u32::MAX);
        for variable in &self.parameters {
            let mut order: Vec<u32> = (0..strata).collect();
            order.shuffle(&mut self.rng);
            let (low, _) = variable.bounds();
            let width = variable.span() / f64::from(strata);
            for (row, stratum) in rows.iter_mut().zip(order) {
                let offset: f64 = self.rng.random_range(0.0..1.0);
                let value = low + (f64::from(stratum) + offset) * width;
                row.insert(variable.name().to_owned(), variable.clamp(value));
            }
        }
        rows
    }
}

impl Strategy for LatinHypercube {
    fn name(&self) -> &'static str {
        NAME
    }

    fn accepts_history(&self) -> bool {
        true
    }

    fn suggest(
        &mut self,
        batch_size: usize,
        _observations: &[ObservationRow],
    ) -> Result<Vec<ParameterRow>, StrategyError> {
        Ok(self.design(batch_size))
    }

    fn suggest_next(&mut self) -> Result<ParameterRow, StrategyError> {
        self.design(1)
            .pop()
            .ok_or_else(|| StrategyError::EmptyBatch {
                algorithm: NAME.to_owned(),
            })
    }

    fn describe(&self) -> Value {
        json!({
            "name": NAME,
            "seed": self.seed,
            "domain": self.domain,
        })
    }
}
