//! Reply documents sent back to clients.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::FrameError;

/// One suggested experiment: parameter name to proposed value.
pub type ParameterRow = BTreeMap<String, f64>;

const BATCH_PREFIX: &str = "batch ";

/// Formats the wire label of the batch at the given 1-based position.
#[must_use]
pub fn batch_label(position: usize) -> String {
    format!("{BATCH_PREFIX}{position}")
}

/// Ordered suggestions returned by a cycle, serialised as
/// `{"batch 1": {...}, "batch 2": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, ParameterRow>")]
pub struct SuggestionBatches {
    batches: Vec<ParameterRow>,
}

impl SuggestionBatches {
    /// Wraps rows in delivery order.
    #[must_use]
    pub const fn new(batches: Vec<ParameterRow>) -> Self {
        Self { batches }
    }

    /// Number of batches in the reply.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Returns `true` when the reply holds no batches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Returns the batch at the given 1-based position.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&ParameterRow> {
        position
            .checked_sub(1)
            .and_then(|index| self.batches.get(index))
    }

    /// Iterates over batches in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterRow> {
        self.batches.iter()
    }
}

impl Serialize for SuggestionBatches {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.batches.len()))?;
        for (index, row) in self.batches.iter().enumerate() {
            map.serialize_entry(&batch_label(index.saturating_add(1)), row)?;
        }
        map.end()
    }
}

impl TryFrom<BTreeMap<String, ParameterRow>> for SuggestionBatches {
    type Error = String;

    fn try_from(labelled: BTreeMap<String, ParameterRow>) -> Result<Self, Self::Error> {
        let mut positioned = labelled
            .into_iter()
            .map(|(label, row)| {
                label
                    .strip_prefix(BATCH_PREFIX)
                    .and_then(|position| position.parse::<usize>().ok())
                    .map(|position| (position, row))
                    .ok_or_else(|| format!("unexpected batch label '{label}'"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        positioned.sort_by_key(|(position, _)| *position);
        for (expected, (position, _)) in (1_usize..).zip(&positioned) {
            if *position != expected {
                return Err(format!("missing batch {expected}"));
            }
        }
        Ok(Self::new(positioned.into_iter().map(|(_, row)| row).collect()))
    }
}

/// A reply document.
///
/// Variants are untagged on the wire: each serialises to the bare object
/// shape clients match on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    /// Acknowledges initialisation with the optimiser's configuration.
    Ack {
        /// Opaque description of the configured optimiser.
        strategy: serde_json::Value,
    },
    /// Acknowledges an explicit close.
    Closed {
        /// Hash of the session that was closed.
        closed: String,
    },
    /// Reports a failure in place of the normal payload.
    Error {
        /// Diagnostic text.
        exception: String,
    },
    /// Next experiments to run.
    Suggestions(SuggestionBatches),
}

impl Reply {
    /// Builds an error reply from any displayable failure.
    pub fn error(error: impl std::fmt::Display) -> Self {
        Self::Error {
            exception: error.to_string(),
        }
    }

    /// Returns `true` for error replies.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Encodes the reply as a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Encode`] if serialisation fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        serde_json::to_vec(self).map_err(FrameError::Encode)
    }

    /// Decodes a reply document.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the payload is not a recognised reply.
    pub fn parse(payload: &[u8]) -> Result<Self, FrameError> {
        serde_json::from_slice(payload.trim_ascii()).map_err(FrameError::from_json_error)
    }
}
