//! Request documents and their decoding rules.
//!
//! Clients do not tag their requests; the shape is inferred from the fields
//! present. A document carrying `close: true` is a close request, one carrying
//! an `algorithm` block is an initialisation request, and anything else is an
//! observation/suggestion cycle.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::FrameError;

/// Label of the batch that defines the canonical variable set.
const CANONICAL_BATCH: &str = "batch 1";

/// Named columns of historical values, one entry per recorded experiment.
pub type ColumnSet = BTreeMap<String, Vec<f64>>;

/// Opaque identifier of an optimisation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHash(String);

impl SessionHash {
    /// Wraps a raw session identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHash {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl Borrow<str> for SessionHash {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionHash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Algorithm selection plus optimiser-specific tuning keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Name of the optimiser implementation to instantiate.
    pub name: String,
    /// Remaining keys, passed through to the optimiser untouched.
    #[serde(flatten)]
    pub tuning: serde_json::Map<String, serde_json::Value>,
}

impl AlgorithmConfig {
    /// Builds a configuration with no tuning keys.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tuning: serde_json::Map::new(),
        }
    }

    /// Adds a tuning key, replacing any previous value.
    #[must_use]
    pub fn with_tuning(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.tuning.insert(key.into(), value);
        self
    }
}

/// Inclusive bounds declared for one tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    /// Lower bound.
    pub min_value: f64,
    /// Upper bound.
    pub max_value: f64,
}

/// Declaration of one objective variable.
///
/// The compact form is a bare number `b`, meaning a maximised objective in
/// `[0, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    /// Maximised objective bounded by `[0, value]`.
    Bound(f64),
    /// Objective with explicit bounds and direction.
    Range {
        /// Lower bound.
        min_value: f64,
        /// Upper bound.
        max_value: f64,
        /// Whether larger values are better.
        #[serde(default = "maximize_by_default")]
        maximize: bool,
    },
}

const fn maximize_by_default() -> bool {
    true
}

impl TargetSpec {
    /// Returns the `(low, high)` bounds of the objective.
    #[must_use]
    pub const fn bounds(&self) -> (f64, f64) {
        match *self {
            Self::Bound(high) => (0.0, high),
            Self::Range {
                min_value,
                max_value,
                ..
            } => (min_value, max_value),
        }
    }

    /// Returns whether the objective is maximised.
    #[must_use]
    pub const fn maximize(&self) -> bool {
        match *self {
            Self::Bound(_) => true,
            Self::Range { maximize, .. } => maximize,
        }
    }
}

/// How many trailing history entries a cycle request contributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchCount {
    /// Every recorded entry.
    #[default]
    All,
    /// Only the last `n` entries. Zero and negative counts decode as
    /// [`BatchCount::All`].
    Last(usize),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireCount {
    Number(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for BatchCount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match WireCount::deserialize(deserializer)? {
            WireCount::Number(count) if count <= 0 => Ok(Self::All),
            WireCount::Number(count) => usize::try_from(count)
                .map(Self::Last)
                .map_err(D::Error::custom),
            WireCount::Text(text) if text.trim().eq_ignore_ascii_case("all") => Ok(Self::All),
            WireCount::Text(text) => Err(D::Error::custom(format!(
                "unsupported batch count '{text}'"
            ))),
        }
    }
}

/// Request that declares the domain and optimiser for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct InitRequest {
    /// Optimiser selection and tuning.
    pub algorithm: AlgorithmConfig,
    /// Number of suggestions per reply, when stated explicitly.
    pub batch_size: Option<usize>,
    /// Parameter bounds keyed by batch label, then by variable name.
    pub parameters: BTreeMap<String, BTreeMap<String, ParameterBounds>>,
    /// Objective declarations keyed by variable name.
    pub target: BTreeMap<String, TargetSpec>,
}

impl InitRequest {
    /// Returns the batch whose variables define the session domain.
    ///
    /// All batches are assumed to share one variable set, so `"batch 1"` is
    /// used when present and the first declared batch otherwise.
    #[must_use]
    pub fn canonical_parameters(&self) -> Option<&BTreeMap<String, ParameterBounds>> {
        self.parameters
            .get(CANONICAL_BATCH)
            .or_else(|| self.parameters.values().next())
    }

    /// Number of batches declared in the parameter block.
    #[must_use]
    pub fn declared_batches(&self) -> usize {
        self.parameters.len()
    }
}

/// Request that reports results and asks for the next suggestions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleRequest {
    /// Historical parameter values, one column per variable.
    pub parameters: Option<ColumnSet>,
    /// Historical result values, one column per objective.
    pub result: Option<ColumnSet>,
    /// How many trailing entries of the columns to use.
    pub n_batches: BatchCount,
    /// Replacement batch size for this and later replies.
    pub n_returns: Option<usize>,
}

/// The shape-specific portion of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Domain and optimiser declaration.
    Init(InitRequest),
    /// Result report and suggestion query.
    Cycle(CycleRequest),
    /// Explicit end of the session.
    Close,
}

/// A decoded request addressed to one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Session the request belongs to.
    pub hash: SessionHash,
    /// Shape-specific payload.
    pub body: RequestBody,
}

#[derive(Deserialize)]
struct WireRequest {
    hash: String,
    #[serde(default)]
    close: bool,
    algorithm: Option<AlgorithmConfig>,
    batch_size: Option<usize>,
    parameters: Option<serde_json::Value>,
    target: Option<BTreeMap<String, TargetSpec>>,
    result: Option<ColumnSet>,
    #[serde(default)]
    n_batches: BatchCount,
    n_returns: Option<usize>,
}

impl Request {
    /// Decodes one request document.
    ///
    /// Surrounding ASCII whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Malformed`] when the payload is empty or not
    /// valid JSON, and [`FrameError::InvalidStructure`] when it is valid JSON
    /// that matches no request shape.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        let trimmed = payload.trim_ascii();
        if trimmed.is_empty() {
            return Err(FrameError::malformed("empty request"));
        }
        let wire: WireRequest =
            serde_json::from_slice(trimmed).map_err(FrameError::from_json_error)?;
        Self::from_wire(wire)
    }

    /// Returns `true` when the request declares an optimiser.
    #[must_use]
    pub const fn is_init(&self) -> bool {
        matches!(self.body, RequestBody::Init(_))
    }

    fn from_wire(wire: WireRequest) -> Result<Self, FrameError> {
        let hash = wire.hash.trim();
        if hash.is_empty() {
            return Err(FrameError::invalid_structure("hash field is empty"));
        }
        let hash = SessionHash::new(hash);

        if wire.close {
            return Ok(Self {
                hash,
                body: RequestBody::Close,
            });
        }

        let body = match wire.algorithm {
            Some(algorithm) => RequestBody::Init(Self::init_body(
                algorithm,
                wire.batch_size,
                wire.parameters,
                wire.target,
            )?),
            None => RequestBody::Cycle(CycleRequest {
                parameters: wire
                    .parameters
                    .map(serde_json::from_value::<ColumnSet>)
                    .transpose()
                    .map_err(|error| {
                        FrameError::invalid_structure(format!(
                            "parameters must map variable names to value lists: {error}"
                        ))
                    })?,
                result: wire.result,
                n_batches: wire.n_batches,
                n_returns: wire.n_returns,
            }),
        };
        Ok(Self { hash, body })
    }

    fn init_body(
        algorithm: AlgorithmConfig,
        batch_size: Option<usize>,
        parameters: Option<serde_json::Value>,
        target: Option<BTreeMap<String, TargetSpec>>,
    ) -> Result<InitRequest, FrameError> {
        let parameters = parameters
            .ok_or_else(|| FrameError::invalid_structure("init request has no parameters block"))?;
        let parameters = serde_json::from_value(parameters).map_err(|error| {
            FrameError::invalid_structure(format!(
                "parameters must map batch labels to variable bounds: {error}"
            ))
        })?;
        let target =
            target.ok_or_else(|| FrameError::invalid_structure("init request has no target block"))?;
        Ok(InitRequest {
            algorithm,
            batch_size,
            parameters,
            target,
        })
    }
}
