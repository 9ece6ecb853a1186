use rand::rngs::StdRng;
use serde_json::{Map, Value, json};

use summit_protocol::ParameterRow;

use crate::domain::{Domain, ObservationRow, Variable, VariableRole};

use super::sample::uniform;
use super::tuning::{TuningReader, rng_from};
use super::{Strategy, StrategyError};

const NAME: &str = "HillClimb";
const DEFAULT_STEP: f64 = 0.1;

/// Local search that perturbs the best observation so far.
///
/// Each parameter moves by a uniform offset of at most `step` times its range
/// and is clamped back into bounds. Without usable history the strategy
/// samples uniformly.
#[derive(Debug)]
pub struct HillClimb {
    parameters: Vec<Variable>,
    objective: Option<(String, bool)>,
    step: f64,
    seed: Option<u64>,
    rng: StdRng,
    domain: Value,
}

impl HillClimb {
    /// Builds the strategy from its tuning keys (`seed`, `step`).
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::InvalidTuning`] for unknown keys or a step
    /// outside `(0, 1]`.
    pub fn configure(domain: &Domain, tuning: &Map<String, Value>) -> Result<Self, StrategyError> {
        let mut reader = TuningReader::new(NAME, tuning);
        let seed = reader.seed()?;
        let step = reader.number("step")?.unwrap_or(DEFAULT_STEP);
        reader.finish()?;
        if !(step > 0.0 && step <= 1.0) {
            return Err(StrategyError::invalid_tuning(
                NAME,
                format!("step must lie in (0, 1], got {step}"),
            ));
        }
        let objective = domain.primary_objective().map(|variable| {
            let maximize = matches!(variable.role(), VariableRole::Objective { maximize: true });
            (variable.name().to_owned(), maximize)
        });
        Ok(Self {
            parameters: domain.parameters().cloned().collect(),
            objective,
            step,
            seed,
            rng: rng_from(seed),
            domain: domain.describe(),
        })
    }

    fn best<'a>(&self, observations: &'a [ObservationRow]) -> Option<&'a ObservationRow> {
        let (name, maximize) = self.objective.as_ref()?;
        let scored = observations
            .iter()
            .filter_map(|row| row.get(name).map(|score| (score, row)));
        let best = if *maximize {
            scored.max_by(|(left, _), (right, _)| left.total_cmp(right))
        } else {
            scored.min_by(|(left, _), (right, _)| left.total_cmp(right))
        };
        best.map(|(_, row)| row)
    }

    fn random_point(&mut self) -> Result<ParameterRow, StrategyError> {
        self.parameters
            .iter()
            .map(|variable| {
                let (low, high) = variable.bounds();
                uniform(&mut self.rng, NAME, low, high)
                    .map(|value| (variable.name().to_owned(), value))
            })
            .collect()
    }

    fn neighbour(&mut self, centre: &ObservationRow) -> Result<ParameterRow, StrategyError> {
        self.parameters
            .iter()
            .map(|variable| {
                let (low, high) = variable.bounds();
                let value = match centre.get(variable.name()) {
                    Some(origin) => {
                        let reach = self.step * variable.span();
                        variable.clamp(origin + uniform(&mut self.rng, NAME, -reach, reach)?)
                    }
                    None => uniform(&mut self.rng, NAME, low, high)?,
                };
                Ok((variable.name().to_owned(), value))
            })
            .collect()
    }
}

impl Strategy for HillClimb {
    fn name(&self) -> &'static str {
        NAME
    }

    fn accepts_history(&self) -> bool {
        true
    }

    fn suggest(
        &mut self,
        batch_size: usize,
        observations: &[ObservationRow],
    ) -> Result<Vec<ParameterRow>, StrategyError> {
        match self.best(observations).cloned() {
            Some(centre) => (0..batch_size).map(|_| self.neighbour(&centre)).collect(),
            None => (0..batch_size).map(|_| self.random_point()).collect(),
        }
    }

    fn suggest_next(&mut self) -> Result<ParameterRow, StrategyError> {
        self.random_point()
    }

    fn describe(&self) -> Value {
        json!({
            "name": NAME,
            "seed": self.seed,
            "step": self.step,
            "domain": self.domain,
        })
    }
}
