//! Error types for the observability core
//!
//! Instrumentation calls never return these. They surface from configuration
//! loading and JSON rendering, and the health registry uses them internally to
//! turn a failing probe into the message of an `unhealthy` result.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the observability core
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML configuration could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON rendering failed
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Health Probe Errors
    // =========================================================================
    /// Probe returned an error
    #[error("Health check '{name}' failed: {reason}")]
    ProbeFailed { name: String, reason: String },

    /// Probe panicked
    #[error("Health check '{name}' panicked: {reason}")]
    ProbePanicked { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display() {
        let err = Error::ProbeFailed {
            name: "db".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Health check 'db' failed: connection refused"
        );
    }

    #[test]
    fn test_from_json_error() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
