//! Conversion of client-reported history into observation rows, and the rule
//! that reconciles new rows with what a session already holds.

use std::collections::BTreeMap;

use thiserror::Error;

use summit_protocol::{BatchCount, ColumnSet};

use crate::domain::{Domain, ObservationRow};

/// Reasons reported history cannot be turned into observation rows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    /// Results were reported without the parameters that produced them.
    #[error("result block supplied without a parameters block")]
    MissingParameters,
    /// A variable appears in both the parameter and result blocks.
    #[error("variable '{name}' appears in both parameters and result")]
    DuplicateColumn {
        /// Offending name.
        name: String,
    },
    /// A domain variable has no column.
    #[error("no values reported for variable '{name}'")]
    MissingVariable {
        /// Missing name.
        name: String,
    },
    /// A column names a variable outside the domain.
    #[error("variable '{name}' is not part of the session domain")]
    UnknownVariable {
        /// Unexpected name.
        name: String,
    },
    /// Columns disagree on how many experiments were recorded.
    #[error("variable '{name}' has {length} values but other columns have {expected}")]
    RaggedColumns {
        /// Offending name.
        name: String,
        /// Its column length.
        length: usize,
        /// Length of the other columns.
        expected: usize,
    },
    /// More trailing entries were requested than recorded.
    #[error("requested the last {requested} experiments but only {available} were reported")]
    InsufficientHistory {
        /// Requested trailing entries.
        requested: usize,
        /// Recorded entries.
        available: usize,
    },
    /// A reported value is NaN or infinite.
    #[error("variable '{name}' has a non-finite value at position {position}")]
    NonFinite {
        /// Offending name.
        name: String,
        /// Position within the column.
        position: usize,
    },
}

/// Which branch of the merge rule was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    /// New rows were appended to the accumulated table.
    Appended,
    /// The accumulated table was replaced by the new rows.
    Replaced,
}

/// Accumulated observation table of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetBuilder {
    accumulated: Vec<ObservationRow>,
}

impl DatasetBuilder {
    /// Rows accumulated so far, oldest first.
    #[must_use]
    pub fn rows(&self) -> &[ObservationRow] {
        &self.accumulated
    }

    /// Number of accumulated rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    /// Returns `true` when nothing has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    /// Zips parameter and result columns into one row per recorded position,
    /// keeping only the trailing positions selected by `count`.
    pub fn build(
        domain: &Domain,
        parameters: &ColumnSet,
        results: &ColumnSet,
        count: BatchCount,
    ) -> Result<Vec<ObservationRow>, DatasetError> {
        let columns = combine_columns(parameters, results)?;
        for name in columns.keys() {
            if domain.variable(name).is_none() {
                return Err(DatasetError::UnknownVariable {
                    name: (*name).to_owned(),
                });
            }
        }
        let mut ordered = Vec::with_capacity(domain.variables().len());
        for variable in domain.variables() {
            let column = columns.get(variable.name()).ok_or_else(|| {
                DatasetError::MissingVariable {
                    name: variable.name().to_owned(),
                }
            })?;
            ordered.push((variable.name(), *column));
        }

        let available = common_length(&ordered)?;
        let start = match count {
            BatchCount::All => 0,
            BatchCount::Last(requested) => available.checked_sub(requested).ok_or(
                DatasetError::InsufficientHistory {
                    requested,
                    available,
                },
            )?,
        };

        (start..available)
            .map(|position| {
                ordered
                    .iter()
                    .map(|(name, column)| match column.get(position) {
                        Some(value) if value.is_finite() => Ok(((*name).to_owned(), *value)),
                        _ => Err(DatasetError::NonFinite {
                            name: (*name).to_owned(),
                            position,
                        }),
                    })
                    .collect::<Result<ObservationRow, _>>()
            })
            .collect()
    }

    /// Returns the table that results from merging `new_rows`, leaving `self`
    /// untouched.
    ///
    /// Rows are appended when the accumulated row count equals the number of
    /// suggestions last handed out, meaning the client reported exactly the
    /// experiments it was given. Any other count is treated as a resubmission
    /// of the full history and replaces the table.
    #[must_use]
    pub fn merged(
        &self,
        new_rows: Vec<ObservationRow>,
        last_suggestion_row_count: usize,
    ) -> (Self, MergeKind) {
        if self.accumulated.len() == last_suggestion_row_count {
            let mut accumulated = self.accumulated.clone();
            accumulated.extend(new_rows);
            (Self { accumulated }, MergeKind::Appended)
        } else {
            (
                Self {
                    accumulated: new_rows,
                },
                MergeKind::Replaced,
            )
        }
    }
}

fn combine_columns<'a>(
    parameters: &'a ColumnSet,
    results: &'a ColumnSet,
) -> Result<BTreeMap<&'a str, &'a Vec<f64>>, DatasetError> {
    let mut columns: BTreeMap<&str, &Vec<f64>> = parameters
        .iter()
        .map(|(name, column)| (name.as_str(), column))
        .collect();
    for (name, column) in results {
        if columns.insert(name.as_str(), column).is_some() {
            return Err(DatasetError::DuplicateColumn { name: name.clone() });
        }
    }
    Ok(columns)
}

fn common_length(columns: &[(&str, &Vec<f64>)]) -> Result<usize, DatasetError> {
    let mut lengths = columns.iter().map(|(_, column)| column.len());
    let expected = lengths.next().unwrap_or(0);
    for (name, column) in columns {
        if column.len() != expected {
            return Err(DatasetError::RaggedColumns {
                name: (*name).to_owned(),
                length: column.len(),
                expected,
            });
        }
    }
    Ok(expected)
}
