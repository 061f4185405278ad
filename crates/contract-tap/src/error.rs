//! Error types surfaced by the pipeline.
//!
//! Only two failure families ever reach a caller: configuration errors at
//! registration time and transport errors from the underlying call. Capture
//! and validation failures are always recovered inside the pipeline.

use thiserror::Error;

/// Rejected contract configuration. Registration is all-or-nothing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one contract must be registered")]
    NoContracts,

    #[error("contract #{index} has no method")]
    MissingMethod { index: usize },

    #[error("contract #{index} ({method}) has no path")]
    MissingPath { index: usize, method: String },
}

/// Failure of the underlying HTTP call.
///
/// Cloneable so the interception layer can hand the same error to both the
/// error event and the original caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("{0}")]
    Other(String),
}

/// Failure inside the schema evaluator itself (not a failed check).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluatorError {
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("schema evaluation failed: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::NoContracts.to_string(),
            "at least one contract must be registered"
        );
        let err = ConfigError::MissingPath {
            index: 2,
            method: "GET".to_string(),
        };
        assert_eq!(err.to_string(), "contract #2 (GET) has no path");
    }

    #[test]
    fn test_transport_error_is_cloneable() {
        let err = TransportError::Connect("refused".to_string());
        assert_eq!(err.clone(), err);
        assert_eq!(err.to_string(), "connection failed: refused");
    }
}
