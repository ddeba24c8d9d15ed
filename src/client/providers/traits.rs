use crate::client::RawRecord;
use crate::identity::{Identifier, IdentifierKind};
use crate::merge::quality::QualityMetrics;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during adapter operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("upstream server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not supported: {0}")]
    NotSupported(String),
}

impl AdapterError {
    /// Timeouts, rate limiting, 5xx and connection failures are worth retrying
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited { .. } | Self::Server { .. } | Self::Network(_)
        )
    }

    /// Provider-supplied delay before the next attempt, if any
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::Timeout,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Server { .. } => ErrorKind::ServerError,
            Self::Network(_) => ErrorKind::Network,
            Self::Client { .. } => ErrorKind::ClientError,
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotSupported(_) => ErrorKind::NotSupported,
        }
    }
}

/// Failure kind reported per source in every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    ServerError,
    Network,
    ClientError,
    Malformed,
    NotFound,
    NotSupported,
    Cancelled,
}

/// One source that did not contribute to a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceFailure {
    pub source: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl SourceFailure {
    pub fn from_error(source: impl Into<String>, error: &AdapterError) -> Self {
        Self {
            source: source.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Identifier-based operations an adapter may serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOperation {
    Details,
    References,
    Citing,
    Similar,
}

/// What an adapter can do, and which identifier kinds it accepts for each
/// identifier-based operation (in order of preference).
#[derive(Debug, Clone, Default)]
pub struct AdapterCapabilities {
    pub search: bool,
    pub details: Vec<IdentifierKind>,
    pub references: Vec<IdentifierKind>,
    pub citing: Vec<IdentifierKind>,
    pub similar: Vec<IdentifierKind>,
    pub converts_identifiers: bool,
}

impl AdapterCapabilities {
    #[must_use]
    pub fn identifiers_for(&self, operation: IdOperation) -> &[IdentifierKind] {
        match operation {
            IdOperation::Details => &self.details,
            IdOperation::References => &self.references,
            IdOperation::Citing => &self.citing,
            IdOperation::Similar => &self.similar,
        }
    }

    #[must_use]
    pub fn supports(&self, operation: IdOperation) -> bool {
        !self.identifiers_for(operation).is_empty()
    }
}

/// Uniform capability surface for one academic data provider.
///
/// Query strings are passed through untouched; providers accept their own
/// boolean/field-qualified syntax.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique name/identifier for this adapter
    fn name(&self) -> &str;

    /// Human-readable description of the provider
    fn description(&self) -> &str;

    fn capabilities(&self) -> AdapterCapabilities;

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<RawRecord>, AdapterError>;

    async fn fetch_details(&self, id: &Identifier) -> Result<RawRecord, AdapterError>;

    async fn fetch_references(
        &self,
        id: &Identifier,
        _max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        Err(unsupported(self.name(), "references", id))
    }

    async fn fetch_citing(
        &self,
        id: &Identifier,
        _max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        Err(unsupported(self.name(), "citing articles", id))
    }

    async fn fetch_similar(
        &self,
        id: &Identifier,
        _max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        Err(unsupported(self.name(), "similar articles", id))
    }

    /// Map an identifier onto another kind. `Ok(None)` means the provider
    /// knows the work but has no identifier of the requested kind.
    async fn convert_identifier(
        &self,
        id: &Identifier,
        _target: IdentifierKind,
    ) -> Result<Option<Identifier>, AdapterError> {
        Err(unsupported(self.name(), "identifier conversion", id))
    }
}

/// Journal-level metrics provider
#[async_trait]
pub trait QualityProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_metrics(&self, journal_name: &str) -> Result<QualityMetrics, AdapterError>;
}

pub(crate) fn unsupported(adapter: &str, operation: &str, id: &Identifier) -> AdapterError {
    AdapterError::NotSupported(format!("{adapter} does not provide {operation} for {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AdapterError::Timeout.is_transient());
        assert!(AdapterError::RateLimited { retry_after: None }.is_transient());
        assert!(AdapterError::Server {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!AdapterError::Malformed("bad json".to_string()).is_transient());
        assert!(!AdapterError::NotFound("x".to_string()).is_transient());
        assert!(!AdapterError::Client {
            status: 400,
            message: "bad request".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_capabilities_lookup() {
        let caps = AdapterCapabilities {
            search: true,
            details: vec![IdentifierKind::Doi],
            ..Default::default()
        };
        assert!(caps.supports(IdOperation::Details));
        assert!(!caps.supports(IdOperation::References));
        assert_eq!(caps.identifiers_for(IdOperation::Details), &[IdentifierKind::Doi]);
    }
}
