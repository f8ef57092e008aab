// QUAK/ESR Feed - Topic dispatch and streaming scan statistics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the feed core
//!
//! None of these errors is fatal: a failing message only leaves the view it
//! would have updated stale.

use thiserror::Error;

/// Result type alias for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Main error type for feed operations
#[derive(Error, Debug)]
pub enum FeedError {
    /// Payload was not JSON, or JSON of the wrong shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Required field absent from a JSON object payload
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Field present but not usable
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Scan point count differs from the established geometry
    #[error("Shape mismatch: expected {expected} points, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A point carries a different number of iterations than the first point
    #[error("Iteration mismatch at point {point}: expected {expected} iterations, got {actual}")]
    IterationMismatch {
        point: usize,
        expected: usize,
        actual: usize,
    },

    /// Timestamp not in `YYYY-MM-DD_HH:MM:SS` form
    #[error("Invalid timestamp '{value}': expected YYYY-MM-DD_HH:MM:SS")]
    InvalidTimestamp { value: String },

    /// Configuration could not be used
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File access failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    /// Errors caused by the content of a single message.
    ///
    /// These are expected on a live feed (undecodable bodies, foreign
    /// publishers on the same topic) and are skipped quietly.
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            FeedError::MalformedPayload(_)
                | FeedError::MissingField(_)
                | FeedError::InvalidField { .. }
                | FeedError::IterationMismatch { .. }
                | FeedError::InvalidTimestamp { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FeedError::ShapeMismatch {
            expected: 64,
            actual: 32,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("64"));
        assert!(msg.contains("32"));
    }

    #[test]
    fn test_payload_error_classification() {
        assert!(FeedError::MissingField("payload").is_payload_error());
        assert!(FeedError::MalformedPayload("raw".to_string()).is_payload_error());
        assert!(!FeedError::ShapeMismatch {
            expected: 1,
            actual: 2
        }
        .is_payload_error());
        assert!(!FeedError::Config("x".to_string()).is_payload_error());
    }

    #[test]
    fn test_json_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: FeedError = json_err.into();
        assert!(matches!(err, FeedError::Json(_)));
    }
}
