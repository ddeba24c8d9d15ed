use super::traits::{AdapterError, QualityProvider};
use super::{string_or_number, EASYSCHOLAR};
use crate::client::{non_empty, send_json};
use crate::merge::quality::QualityMetrics;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://www.easyscholar.cc/open/getPublicationRank";

/// EasyScholar publication-rank lookup (impact factor, JCR quartile, JCI and
/// CAS partition). Requires a secret key; without one every lookup reports
/// `NotSupported`.
pub struct EasyScholarProvider {
    client: Client,
    base_url: String,
    secret_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RankResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<RankData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankData {
    official_rank: Option<OfficialRank>,
}

#[derive(Debug, Deserialize)]
struct OfficialRank {
    select: Option<RankFields>,
    all: Option<RankFields>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankFields {
    #[serde(default, deserialize_with = "string_or_number")]
    sciif: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    sci: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    jci: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    sci_up: Option<String>,
}

impl RankFields {
    fn is_empty(&self) -> bool {
        self.sciif.is_none() && self.sci.is_none() && self.jci.is_none() && self.sci_up.is_none()
    }
}

impl EasyScholarProvider {
    #[must_use]
    pub fn new(client: Client, secret_key: Option<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            secret_key: non_empty(secret_key),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    fn to_metrics(journal_name: &str, response: RankResponse) -> Result<QualityMetrics, AdapterError> {
        if response.code != 200 {
            return Err(AdapterError::Client {
                status: u16::try_from(response.code).unwrap_or(400),
                message: response.msg.unwrap_or_else(|| "EasyScholar rejected the request".to_string()),
            });
        }

        let rank = response
            .data
            .and_then(|d| d.official_rank)
            .and_then(|r| r.select.filter(|s| !s.is_empty()).or(r.all))
            .unwrap_or_default();

        let metrics = QualityMetrics {
            impact_factor: rank.sciif.as_deref().and_then(parse_score),
            quartile: non_empty(rank.sci),
            jci: rank.jci.as_deref().and_then(parse_score),
            cas_zone: non_empty(rank.sci_up),
            data_sources: vec![EASYSCHOLAR.to_string()],
            ..QualityMetrics::new(journal_name)
        };

        if metrics.has_any_metric() {
            Ok(metrics)
        } else {
            Err(AdapterError::NotFound(format!("no EasyScholar rank for '{journal_name}'")))
        }
    }
}

fn parse_score(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[async_trait]
impl QualityProvider for EasyScholarProvider {
    fn name(&self) -> &str {
        EASYSCHOLAR
    }

    async fn get_metrics(&self, journal_name: &str) -> Result<QualityMetrics, AdapterError> {
        let Some(secret_key) = &self.secret_key else {
            return Err(AdapterError::NotSupported(
                "EasyScholar requires an API key".to_string(),
            ));
        };

        debug!("EasyScholar rank lookup for '{}'", journal_name);
        let response: RankResponse = send_json(self.client.get(&self.base_url).query(&[
            ("secretKey", secret_key.as_str()),
            ("publicationName", journal_name),
        ]))
        .await?;

        Self::to_metrics(journal_name, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_rank_preferred() {
        let body = r#"{"code": 200, "msg": "SUCCESS", "data": {"officialRank": {
            "select": {"sciif": "42.778", "sci": "Q1", "sciUp": "1区"},
            "all": {"sciif": "1.0", "sci": "Q4", "jci": "9.1"}
        }}}"#;
        let response: RankResponse = serde_json::from_str(body).unwrap();
        let metrics = EasyScholarProvider::to_metrics("Nature", response).unwrap();

        assert_eq!(metrics.impact_factor, Some(42.778));
        assert_eq!(metrics.quartile.as_deref(), Some("Q1"));
        assert_eq!(metrics.cas_zone.as_deref(), Some("1区"));
        assert_eq!(metrics.jci, None);
        assert_eq!(metrics.data_sources, vec!["easyscholar"]);
    }

    #[test]
    fn test_falls_back_to_all() {
        let body = r#"{"code": 200, "data": {"officialRank": {"select": {}, "all": {"sciif": 3.2, "jci": "1.1"}}}}"#;
        let response: RankResponse = serde_json::from_str(body).unwrap();
        let metrics = EasyScholarProvider::to_metrics("J", response).unwrap();
        assert_eq!(metrics.impact_factor, Some(3.2));
        assert_eq!(metrics.jci, Some(1.1));
    }

    #[test]
    fn test_error_code() {
        let body = r#"{"code": 40001, "msg": "invalid secretKey", "data": null}"#;
        let response: RankResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            EasyScholarProvider::to_metrics("J", response),
            Err(AdapterError::Client { .. })
        ));
    }

    #[test]
    fn test_empty_rank_is_not_found() {
        let body = r#"{"code": 200, "data": {"officialRank": {}}}"#;
        let response: RankResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            EasyScholarProvider::to_metrics("J", response),
            Err(AdapterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key_not_supported() {
        let provider = EasyScholarProvider::new(Client::new(), Some("  ".to_string()));
        assert!(!provider.is_configured());
        assert!(matches!(
            provider.get_metrics("Nature").await,
            Err(AdapterError::NotSupported(_))
        ));
    }
}
