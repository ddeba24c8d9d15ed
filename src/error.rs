use crate::client::providers::{AdapterError, SourceFailure};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the aggregation engine.
///
/// Non-`Clone` library errors are held behind `Arc` so a single failure can be
/// handed to every caller coalesced onto the same cache computation.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Configuration errors (permanent failures)
    #[error("Configuration error: {0}")]
    Config(#[source] Arc<config::ConfigError>),

    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error("Serialization error: {0}")]
    Serde(#[source] Arc<serde_json::Error>),

    #[error("HTTP client error: {0}")]
    Http(#[source] Arc<reqwest::Error>),

    // Caller errors (permanent - never retried)
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    // A single source failure surfaced outside a fan-out
    #[error("Source {source_name} failed: {error}")]
    Source {
        source_name: String,
        error: AdapterError,
    },

    // Every attempted source failed
    #[error("All {} attempted sources failed for {operation}", failures.len())]
    Aggregation {
        operation: String,
        failures: Vec<SourceFailure>,
    },

    #[error("Timeout error: operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Cache error: {operation} failed - {reason}")]
    Cache { operation: String, reason: String },

    #[error("Export error: {0}")]
    Export(String),

    #[error("Service error: {0}")]
    Service(String),
}

/// Error categorization for retry strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permanent errors - should not retry
    Permanent,
    /// Transient errors - safe to retry
    Transient,
    /// Rate limited - retry with backoff
    RateLimited,
}

impl Error {
    /// Categorize error for retry logic
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_)
            | Self::Serde(_)
            | Self::InvalidInput { .. }
            | Self::NotFound { .. }
            | Self::Aggregation { .. }
            | Self::Cache { .. }
            | Self::Export(_)
            | Self::Service(_) => ErrorCategory::Permanent,

            Self::Source { error, .. } => match error {
                AdapterError::RateLimited { .. } => ErrorCategory::RateLimited,
                e if e.is_transient() => ErrorCategory::Transient,
                _ => ErrorCategory::Permanent,
            },

            Self::Http(_) | Self::Io(_) | Self::Timeout { .. } => ErrorCategory::Transient,
        }
    }

    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::RateLimited
        )
    }

    /// Stable type tag used in structured error responses
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "InputError",
            Self::NotFound { .. } => "NotFoundError",
            Self::Aggregation { .. } => "AggregationError",
            Self::Source { error, .. } => {
                if error.is_transient() {
                    "TransientSourceError"
                } else {
                    "PermanentSourceError"
                }
            }
            Self::Timeout { .. } => "TransientSourceError",
            Self::Config(_)
            | Self::Io(_)
            | Self::Serde(_)
            | Self::Http(_)
            | Self::Cache { .. }
            | Self::Export(_)
            | Self::Service(_) => "InternalError",
        }
    }

    /// Shorthand for the most common caller error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Render this error as the structured boundary response.
    ///
    /// Aggregation failures also carry the per-source failure list in the
    /// context so callers can see which sources were attempted.
    #[must_use]
    pub fn to_response(&self, context: serde_json::Value) -> ErrorResponse {
        let mut context = match context {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("detail".to_string(), other);
                map
            }
        };

        if let Self::Aggregation { failures, .. } = self {
            if let Ok(value) = serde_json::to_value(failures) {
                context.insert("sources_failed".to_string(), value);
            }
        }

        ErrorResponse {
            success: false,
            error: self.to_string(),
            error_type: self.error_type().to_string(),
            context: serde_json::Value::Object(context),
        }
    }
}

/// Structured error payload returned across the engine boundary
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_type: String,
    pub context: serde_json::Value,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(Arc::new(err))
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(Arc::new(err))
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Self::Cache {
            operation: "durable store".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Cache {
            operation: "entry encoding".to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::providers::ErrorKind;

    #[test]
    fn test_error_types() {
        assert_eq!(Error::invalid_input("keyword", "empty").error_type(), "InputError");

        let transient = Error::Source {
            source_name: "crossref".to_string(),
            error: AdapterError::Timeout,
        };
        assert_eq!(transient.error_type(), "TransientSourceError");
        assert!(transient.is_retryable());

        let permanent = Error::Source {
            source_name: "crossref".to_string(),
            error: AdapterError::NotFound("10.1/x".to_string()),
        };
        assert_eq!(permanent.error_type(), "PermanentSourceError");
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_aggregation_response_lists_failures() {
        let err = Error::Aggregation {
            operation: "search".to_string(),
            failures: vec![SourceFailure {
                source: "pubmed".to_string(),
                kind: ErrorKind::Timeout,
                message: "request timed out".to_string(),
            }],
        };

        let response = err.to_response(serde_json::json!({"keyword": "CRISPR"}));
        assert!(!response.success);
        assert_eq!(response.error_type, "AggregationError");
        assert_eq!(response.context["keyword"], "CRISPR");
        assert_eq!(response.context["sources_failed"][0]["kind"], "Timeout");
    }

    #[test]
    fn test_rate_limited_category() {
        let err = Error::Source {
            source_name: "arxiv".to_string(),
            error: AdapterError::RateLimited { retry_after: None },
        };
        assert_eq!(err.category(), ErrorCategory::RateLimited);
    }
}
