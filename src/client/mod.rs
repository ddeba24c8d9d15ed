pub mod orchestrator;
pub mod providers;
pub mod rate_limiter;

pub use orchestrator::{FanOutResult, Orchestrator, QualityHandle, SourceHandle, SourceStat};
pub use rate_limiter::RateLimiter;

use crate::client::providers::AdapterError;
use crate::{Error, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// HTTP client configuration shared by every source adapter
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout duration
    pub timeout: Duration,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Maximum redirects to follow
    pub max_redirects: u32,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 5,
            user_agent: format!(
                "research-aggregator/{} (Bibliographic Aggregation)",
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

impl HttpClientConfig {
    /// Build the underlying reqwest client
    pub fn build(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects as usize))
            .user_agent(&self.user_agent)
            .gzip(true)
            .build()
            .map_err(Error::from)
    }
}

/// Provider-native record as returned by one adapter. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawRecord {
    /// Adapter that produced this record
    pub source: String,
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub journal: Option<String>,
    /// ISO-8601 date, possibly truncated to `YYYY-MM` or `YYYY`
    pub publication_date: Option<String>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub arxiv_id: Option<String>,
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub citation_count: Option<u64>,
}

impl RawRecord {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }
}

/// Keep a string field only if it carries something after trimming
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Assemble an ISO date prefix from numeric parts, dropping what is missing
pub(crate) fn iso_date(year: Option<i64>, month: Option<i64>, day: Option<i64>) -> Option<String> {
    let year = year.filter(|y| (1000..=9999).contains(y))?;
    match (month.filter(|m| (1..=12).contains(m)), day) {
        (Some(m), Some(d)) if (1..=31).contains(&d) => Some(format!("{year:04}-{m:02}-{d:02}")),
        (Some(m), _) => Some(format!("{year:04}-{m:02}")),
        (None, _) => Some(format!("{year:04}")),
    }
}

/// Send a request and decode a JSON body, mapping transport and status
/// failures onto [`AdapterError`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> std::result::Result<T, AdapterError> {
    let body = send_text(request).await?;
    serde_json::from_str(&body).map_err(|e| AdapterError::Malformed(e.to_string()))
}

/// Send a request and return the body as text
pub(crate) async fn send_text(request: RequestBuilder) -> std::result::Result<String, AdapterError> {
    let response = request.send().await.map_err(map_transport_error)?;
    let status = response.status();
    debug!("Upstream responded with {}", status);

    if status.is_success() {
        return response.text().await.map_err(map_transport_error);
    }

    let retry_after = parse_retry_after(response.headers());
    let message = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect::<String>();
    Err(status_error(status, retry_after, message))
}

pub(crate) fn status_error(
    status: StatusCode,
    retry_after: Option<Duration>,
    message: String,
) -> AdapterError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimited { retry_after },
        StatusCode::NOT_FOUND => AdapterError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => AdapterError::Timeout,
        s if s.is_server_error() => AdapterError::Server {
            status: s.as_u16(),
            message,
        },
        s => AdapterError::Client {
            status: s.as_u16(),
            message,
        },
    }
}

pub(crate) fn map_transport_error(err: reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout
    } else if err.is_decode() {
        AdapterError::Malformed(err.to_string())
    } else if let Some(status) = err.status() {
        status_error(status, None, err.to_string())
    } else {
        AdapterError::Network(err.to_string())
    }
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
