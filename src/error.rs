//! Boundary errors.
//!
//! Validation problems are never errors in the `Result` sense: they are
//! reported as [`ValidationError`](crate::models::ValidationError) records.
//! [`AllocationError`] covers the few conditions the core cannot express as a
//! record: input of the wrong shape, unreadable configuration, and an
//! unreachable external service.

use std::path::PathBuf;

/// Errors raised at the boundary of the allocation core.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// Input had a structurally different shape than expected
    /// (e.g. an object where an array of rows was expected).
    #[error("invalid input shape for {context}: expected {expected}")]
    InvalidInputShape {
        context: String,
        expected: &'static str,
    },

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration values are invalid or could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external rule/query service did not answer within the retry budget.
    #[error("service '{service}' unavailable after {attempts} attempt(s): {last_error}")]
    ServiceUnavailable {
        service: String,
        attempts: u32,
        last_error: String,
    },
}

impl AllocationError {
    /// Creates an input-shape error.
    pub fn shape(context: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidInputShape {
            context: context.into(),
            expected,
        }
    }
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, AllocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_error_message() {
        let err = AllocationError::shape("clients", "array of row objects");
        assert_eq!(
            err.to_string(),
            "invalid input shape for clients: expected array of row objects"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: AllocationError = parse.unwrap_err().into();
        assert!(matches!(err, AllocationError::Json(_)));
    }
}
