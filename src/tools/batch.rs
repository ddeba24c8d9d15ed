//! Batch wrappers over search and details: many queries or identifiers in one
//! request, run with bounded concurrency, with per-item failures reported
//! alongside the successes.

use super::details::{DetailsInput, DetailsResponse, DetailsTool};
use super::search::{SearchInput, SearchResponse, SearchTool};
use super::default_max_results;
use crate::di::ServiceContext;
use crate::identity::IdentifierKind;
use crate::merge::{CanonicalRecord, Strategy};
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

/// Most queries or identifiers accepted in one batch
pub const MAX_BATCH_SIZE: usize = 100;
/// Upper bound on items in flight at once
pub const MAX_BATCH_CONCURRENCY: usize = 32;

const fn default_search_concurrency() -> usize {
    3
}

const fn default_details_concurrency() -> usize {
    10
}

/// Why one item of a batch produced nothing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchItemError {
    pub error: String,
    pub error_type: String,
}

impl From<&Error> for BatchItemError {
    fn from(error: &Error) -> Self {
        Self {
            error: error.to_string(),
            error_type: error.error_type().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchSearchInput {
    pub queries: Vec<String>,
    /// Sources to query for every keyword (default: `search.default_sources`)
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    /// Maximum results requested from each source, per query (default: 10)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default)]
    pub strategy: Strategy,
    /// Queries in flight at once (default: 3)
    #[serde(default = "default_search_concurrency")]
    pub max_concurrent: usize,
}

impl BatchSearchInput {
    pub fn new<I, S>(queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queries: queries.into_iter().map(Into::into).collect(),
            sources: None,
            max_results: default_max_results(),
            strategy: Strategy::default(),
            max_concurrent: default_search_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryResult {
    pub query: String,
    pub response: Option<SearchResponse>,
    pub error: Option<BatchItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchSearchResponse {
    pub total_queries: usize,
    pub successful_queries: usize,
    /// One entry per distinct query, in input order
    pub results: Vec<QueryResult>,
    /// Every query's records merged and deduplicated
    pub records: Vec<CanonicalRecord>,
    pub total_unique: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchDetailsInput {
    pub identifiers: Vec<String>,
    /// Expected kind for every identifier
    #[serde(default)]
    pub id_type: Option<IdentifierKind>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub include_quality: bool,
    /// Lookups in flight at once (default: 10)
    #[serde(default = "default_details_concurrency")]
    pub max_concurrent: usize,
}

impl BatchDetailsInput {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
            id_type: None,
            sources: None,
            include_quality: false,
            max_concurrent: default_details_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetailsResult {
    pub identifier: String,
    pub response: Option<DetailsResponse>,
    pub error: Option<BatchItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchDetailsResponse {
    pub total_identifiers: usize,
    pub successful: usize,
    /// One entry per distinct identifier, in input order
    pub results: Vec<DetailsResult>,
    pub failed_identifiers: Vec<String>,
    pub success_rate: f64,
    pub elapsed_ms: u64,
}

/// Trimmed, non-empty items with exact repeats removed, bounded in number
fn batch_items(field: &str, items: &[String]) -> Result<Vec<String>> {
    let mut unique: Vec<String> = Vec::with_capacity(items.len());
    for item in items.iter().map(|i| i.trim()).filter(|i| !i.is_empty()) {
        if !unique.iter().any(|u| u == item) {
            unique.push(item.to_string());
        }
    }
    if unique.is_empty() {
        return Err(Error::invalid_input(field, "at least one entry is required"));
    }
    if unique.len() > MAX_BATCH_SIZE {
        return Err(Error::invalid_input(
            field,
            format!("at most {MAX_BATCH_SIZE} entries per batch"),
        ));
    }
    Ok(unique)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Many searches or detail lookups in one call
#[derive(Debug, Clone)]
pub struct BatchTool {
    ctx: Arc<ServiceContext>,
    search: SearchTool,
    details: DetailsTool,
}

impl BatchTool {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            search: SearchTool::new(Arc::clone(&ctx)),
            details: DetailsTool::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    /// Run every query; a query whose sources all fail is reported, not
    /// fatal. Invalid shared parameters reject the whole batch.
    #[instrument(skip(self, input), fields(queries = input.queries.len(), strategy = %input.strategy))]
    pub async fn search(&self, input: BatchSearchInput) -> Result<BatchSearchResponse> {
        let queries = batch_items("queries", &input.queries)?;
        let started = Instant::now();
        let concurrency = input.max_concurrent.clamp(1, MAX_BATCH_CONCURRENCY);

        let tool = &self.search;
        let results: Vec<(String, Result<SearchResponse>)> = stream::iter(queries)
            .map(|query| {
                let search = SearchInput {
                    query: query.clone(),
                    sources: input.sources.clone(),
                    max_results: input.max_results,
                    strategy: input.strategy,
                };
                async move { (query, tool.execute(search).await) }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut all_records = Vec::new();
        let mut entries = Vec::with_capacity(results.len());
        for (query, outcome) in results {
            match outcome {
                Ok(response) => {
                    all_records.extend(response.records.iter().cloned());
                    entries.push(QueryResult {
                        query,
                        response: Some(response),
                        error: None,
                    });
                }
                Err(e @ Error::InvalidInput { .. }) => return Err(e),
                Err(e) => {
                    warn!("Batch query '{}' failed: {}", query, e);
                    entries.push(QueryResult {
                        query,
                        response: None,
                        error: Some(BatchItemError::from(&e)),
                    });
                }
            }
        }

        let records = self
            .ctx
            .merge_engine()
            .merge_canonical(all_records, Strategy::Union);
        let successful_queries = entries.iter().filter(|e| e.response.is_some()).count();

        info!(
            "Batch search: {}/{} queries answered, {} unique records",
            successful_queries,
            entries.len(),
            records.len()
        );
        Ok(BatchSearchResponse {
            total_queries: entries.len(),
            successful_queries,
            results: entries,
            total_unique: records.len(),
            records,
            elapsed_ms: elapsed_ms(started),
        })
    }

    /// Look up every identifier; each failure, including a malformed
    /// identifier, is reported against that identifier only
    #[instrument(skip(self, input), fields(identifiers = input.identifiers.len()))]
    pub async fn details(&self, input: BatchDetailsInput) -> Result<BatchDetailsResponse> {
        let identifiers = batch_items("identifiers", &input.identifiers)?;
        let started = Instant::now();
        let concurrency = input.max_concurrent.clamp(1, MAX_BATCH_CONCURRENCY);

        let tool = &self.details;
        let results: Vec<(String, Result<DetailsResponse>)> = stream::iter(identifiers)
            .map(|identifier| {
                let lookup = DetailsInput {
                    identifier: identifier.clone(),
                    id_type: input.id_type,
                    sources: input.sources.clone(),
                    include_quality: input.include_quality,
                };
                async move { (identifier, tool.execute(lookup).await) }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut entries = Vec::with_capacity(results.len());
        let mut failed_identifiers = Vec::new();
        for (identifier, outcome) in results {
            match outcome {
                Ok(response) => entries.push(DetailsResult {
                    identifier,
                    response: Some(response),
                    error: None,
                }),
                Err(e) => {
                    warn!("Batch lookup of '{}' failed: {}", identifier, e);
                    failed_identifiers.push(identifier.clone());
                    entries.push(DetailsResult {
                        identifier,
                        response: None,
                        error: Some(BatchItemError::from(&e)),
                    });
                }
            }
        }

        let successful = entries.len() - failed_identifiers.len();
        #[allow(clippy::cast_precision_loss)]
        let success_rate = successful as f64 / entries.len() as f64;

        info!(
            "Batch details: {}/{} identifiers found",
            successful,
            entries.len()
        );
        Ok(BatchDetailsResponse {
            total_identifiers: entries.len(),
            successful,
            results: entries,
            failed_identifiers,
            success_rate,
            elapsed_ms: elapsed_ms(started),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_items_trims_and_dedups() {
        let items = vec![
            " crispr ".to_string(),
            String::new(),
            "crispr".to_string(),
            "base editing".to_string(),
        ];
        assert_eq!(batch_items("queries", &items).unwrap(), vec!["crispr", "base editing"]);
    }

    #[test]
    fn test_batch_items_bounds() {
        let err = batch_items("queries", &["  ".to_string()]).unwrap_err();
        assert_eq!(err.error_type(), "InputError");

        let too_many: Vec<String> = (0..=MAX_BATCH_SIZE).map(|i| format!("q{i}")).collect();
        assert!(batch_items("queries", &too_many).is_err());
    }

    #[test]
    fn test_input_defaults() {
        let search: BatchSearchInput = serde_json::from_str(r#"{"queries": ["a", "b"]}"#).unwrap();
        assert_eq!(search.max_concurrent, 3);
        assert_eq!(search.max_results, 10);

        let details: BatchDetailsInput =
            serde_json::from_str(r#"{"identifiers": ["10.1/x"]}"#).unwrap();
        assert_eq!(details.max_concurrent, 10);
        assert!(!details.include_quality);
    }
}
