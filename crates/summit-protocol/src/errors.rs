//! Errors raised while decoding or encoding wire documents.

use serde_json::error::Category;
use thiserror::Error;

/// Failures surfaced while turning bytes into typed documents and back.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The payload was not a syntactically valid JSON document.
    #[error("malformed request: {message}")]
    Malformed {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying decoder error, when one exists.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// The payload was valid JSON but did not match any request shape.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// Human-readable description of the mismatch.
        message: String,
    },
    /// Serialising a document failed.
    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
}

impl FrameError {
    /// Classifies a decoder error as either malformed input or a shape
    /// mismatch.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        match source.classify() {
            Category::Data => Self::InvalidStructure {
                message: source.to_string(),
            },
            Category::Io | Category::Syntax | Category::Eof => Self::Malformed {
                message: source.to_string(),
                source: Some(source),
            },
        }
    }

    /// Creates a malformed-payload error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a structural error with a custom message.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_are_malformed() {
        let error = serde_json::from_str::<serde_json::Value>("{not json")
            .map_err(FrameError::from_json_error)
            .expect_err("decode should fail");
        assert!(matches!(error, FrameError::Malformed { .. }));
    }

    #[test]
    fn type_mismatches_are_structural() {
        let error = serde_json::from_str::<Vec<u32>>(r#"{"a":1}"#)
            .map_err(FrameError::from_json_error)
            .expect_err("decode should fail");
        assert!(matches!(error, FrameError::InvalidStructure { .. }));
    }
}
