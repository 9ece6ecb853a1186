//! Optimisation domains: the tunable parameters and measured objectives of a
//! session.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Value, json};
use thiserror::Error;

use summit_protocol::InitRequest;

/// One completed experiment: every domain variable mapped to its value.
pub type ObservationRow = BTreeMap<String, f64>;

/// Whether a variable is tuned by the optimiser or measured by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableRole {
    /// Chosen by the optimiser.
    Parameter,
    /// Reported by the client after running an experiment.
    Objective {
        /// Whether larger values are better.
        maximize: bool,
    },
}

/// A continuous variable with inclusive bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    low: f64,
    high: f64,
    role: VariableRole,
}

impl Variable {
    /// Declares a tunable parameter.
    pub fn parameter(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            low,
            high,
            role: VariableRole::Parameter,
        }
    }

    /// Declares an objective.
    pub fn objective(name: impl Into<String>, low: f64, high: f64, maximize: bool) -> Self {
        Self {
            name: name.into(),
            low,
            high,
            role: VariableRole::Objective { maximize },
        }
    }

    /// Variable name, unique within its domain.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inclusive `(low, high)` bounds.
    #[must_use]
    pub const fn bounds(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    /// Width of the bounded interval.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.high - self.low
    }

    /// Role of the variable.
    #[must_use]
    pub const fn role(&self) -> VariableRole {
        self.role
    }

    /// Returns `true` for objectives.
    #[must_use]
    pub const fn is_objective(&self) -> bool {
        matches!(self.role, VariableRole::Objective { .. })
    }

    /// Clamps a value into the variable's bounds.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.low, self.high)
    }

    fn describe(&self) -> Value {
        match self.role {
            VariableRole::Parameter => json!({
                "name": self.name,
                "kind": "continuous",
                "bounds": [self.low, self.high],
                "is_objective": false,
            }),
            VariableRole::Objective { maximize } => json!({
                "name": self.name,
                "kind": "continuous",
                "bounds": [self.low, self.high],
                "is_objective": true,
                "maximize": maximize,
            }),
        }
    }
}

/// Reasons a domain declaration is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    /// Two variables share a name.
    #[error("variable '{name}' is declared more than once")]
    DuplicateVariable {
        /// Offending name.
        name: String,
    },
    /// Bounds are not finite, not strictly increasing, or too far apart for
    /// their width to be finite.
    #[error("variable '{name}' has invalid bounds [{low}, {high}]")]
    InvalidBounds {
        /// Offending name.
        name: String,
        /// Declared lower bound.
        low: f64,
        /// Declared upper bound.
        high: f64,
    },
    /// No tunable parameter was declared.
    #[error("domain declares no parameters")]
    NoParameters,
    /// No objective was declared.
    #[error("domain declares no objectives")]
    NoObjectives,
}

/// Ordered set of variables an optimiser works over.
///
/// Parameters precede objectives; within each group variables are ordered by
/// name.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    variables: Vec<Variable>,
}

impl Domain {
    /// Validates and builds a domain.
    pub fn new(variables: Vec<Variable>) -> Result<Self, DomainError> {
        let mut seen = BTreeSet::new();
        for variable in &variables {
            if !seen.insert(variable.name.as_str()) {
                return Err(DomainError::DuplicateVariable {
                    name: variable.name.clone(),
                });
            }
            let (low, high) = variable.bounds();
            if !(low.is_finite() && high.is_finite() && low < high && variable.span().is_finite())
            {
                return Err(DomainError::InvalidBounds {
                    name: variable.name.clone(),
                    low,
                    high,
                });
            }
        }
        if variables.iter().all(Variable::is_objective) {
            return Err(DomainError::NoParameters);
        }
        if !variables.iter().any(Variable::is_objective) {
            return Err(DomainError::NoObjectives);
        }
        Ok(Self { variables })
    }

    /// Builds the domain declared by an initialisation request.
    ///
    /// Parameters come from the request's canonical batch and objectives from
    /// its target block.
    pub fn from_init(init: &InitRequest) -> Result<Self, DomainError> {
        let parameters = init
            .canonical_parameters()
            .into_iter()
            .flatten()
            .map(|(name, bounds)| Variable::parameter(name, bounds.min_value, bounds.max_value));
        let objectives = init.target.iter().map(|(name, target)| {
            let (low, high) = target.bounds();
            Variable::objective(name, low, high, target.maximize())
        });
        Self::new(parameters.chain(objectives).collect())
    }

    /// All variables in domain order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Tunable parameters in domain order.
    pub fn parameters(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|variable| !variable.is_objective())
    }

    /// Objectives in domain order.
    pub fn objectives(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|variable| variable.is_objective())
    }

    /// The objective optimisers rank observations by.
    #[must_use]
    pub fn primary_objective(&self) -> Option<&Variable> {
        self.objectives().next()
    }

    /// Looks a variable up by name.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    /// Structured description used in acknowledgement payloads.
    #[must_use]
    pub fn describe(&self) -> Value {
        Value::Array(self.variables.iter().map(Variable::describe).collect())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use summit_protocol::{AlgorithmConfig, ParameterBounds, TargetSpec};

    use super::*;

    fn init(parameters: &[(&str, f64, f64)], target: &[(&str, TargetSpec)]) -> InitRequest {
        let batch = parameters
            .iter()
            .map(|(name, min_value, max_value)| {
                (
                    (*name).to_owned(),
                    ParameterBounds {
                        min_value: *min_value,
                        max_value: *max_value,
                    },
                )
            })
            .collect();
        InitRequest {
            algorithm: AlgorithmConfig::new("RandomSearch"),
            batch_size: None,
            parameters: BTreeMap::from([("batch 1".to_owned(), batch)]),
            target: target
                .iter()
                .map(|(name, spec)| ((*name).to_owned(), *spec))
                .collect(),
        }
    }

    #[test]
    fn builds_parameters_before_objectives() {
        let request = init(
            &[("temp", 0.0, 100.0), ("flow", 1.0, 2.0)],
            &[("yield", TargetSpec::Bound(10.0))],
        );
        let domain = Domain::from_init(&request).expect("valid domain");
        let names: Vec<_> = domain.variables().iter().map(Variable::name).collect();
        assert_eq!(names, ["flow", "temp", "yield"]);
        let objective = domain.primary_objective().expect("objective");
        assert_eq!(objective.bounds(), (0.0, 10.0));
        assert_eq!(objective.role(), VariableRole::Objective { maximize: true });
    }

    #[rstest]
    #[case(&[("x", 1.0, 1.0)], &[("y", TargetSpec::Bound(1.0))])]
    #[case(&[("x", 2.0, 1.0)], &[("y", TargetSpec::Bound(1.0))])]
    #[case(&[("x", 0.0, f64::INFINITY)], &[("y", TargetSpec::Bound(1.0))])]
    #[case(&[("x", -1e308, 1e308)], &[("y", TargetSpec::Bound(1.0))])]
    #[case(&[("x", 0.0, 1.0)], &[("y", TargetSpec::Bound(-1.0))])]
    fn rejects_degenerate_bounds(
        #[case] parameters: &[(&str, f64, f64)],
        #[case] target: &[(&str, TargetSpec)],
    ) {
        let error = Domain::from_init(&init(parameters, target)).expect_err("invalid bounds");
        assert!(matches!(error, DomainError::InvalidBounds { .. }));
    }

    #[test]
    fn rejects_names_shared_by_parameter_and_objective() {
        let request = init(&[("x", 0.0, 1.0)], &[("x", TargetSpec::Bound(1.0))]);
        assert_eq!(
            Domain::from_init(&request),
            Err(DomainError::DuplicateVariable {
                name: "x".to_owned()
            })
        );
    }

    #[test]
    fn requires_both_parameters_and_objectives() {
        assert_eq!(
            Domain::from_init(&init(&[], &[("y", TargetSpec::Bound(1.0))])),
            Err(DomainError::NoParameters)
        );
        assert_eq!(
            Domain::from_init(&init(&[("x", 0.0, 1.0)], &[])),
            Err(DomainError::NoObjectives)
        );
    }

    #[test]
    fn describe_lists_every_variable() {
        let request = init(&[("x", 0.0, 1.0)], &[("y", TargetSpec::Bound(5.0))]);
        let domain = Domain::from_init(&request).expect("valid domain");
        let description = domain.describe();
        assert_eq!(description.as_array().map(Vec::len), Some(2));
        assert_eq!(description[1]["maximize"], json!(true));
    }
}
