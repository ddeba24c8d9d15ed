use super::{default_max_results, normalize_sources, validate_max_results, SourceReport};
use crate::client::providers::SourceFailure;
use crate::client::SourceStat;
use crate::di::ServiceContext;
use crate::merge::{CanonicalRecord, Strategy};
use crate::repositories::{Fingerprint, FingerprintBuilder};
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Input parameters for a multi-source keyword search
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchInput {
    /// Keyword query, passed to every source unmodified
    pub query: String,
    /// Sources to query (default: `search.default_sources`)
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    /// Maximum results requested from each source (default: 10)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// How cross-source matches affect which records are kept
    #[serde(default)]
    pub strategy: Strategy,
}

impl SearchInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sources: None,
            max_results: default_max_results(),
            strategy: Strategy::default(),
        }
    }
}

/// Merged search results plus per-source bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResponse {
    pub query: String,
    pub strategy: Strategy,
    pub records: Vec<CanonicalRecord>,
    pub total: usize,
    /// Sources that answered, in priority order
    pub sources_used: Vec<String>,
    pub sources_failed: Vec<SourceFailure>,
    /// True when the result came from the cache rather than a fresh fan-out
    pub cache_hit: bool,
    pub source_stats: Vec<SourceStat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchPayload {
    records: Vec<CanonicalRecord>,
    report: SourceReport,
}

/// Keyword search across sources with merge/dedup
#[derive(Debug, Clone)]
pub struct SearchTool {
    ctx: Arc<ServiceContext>,
}

impl SearchTool {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, input), fields(query = %input.query, strategy = %input.strategy))]
    pub async fn execute(&self, input: SearchInput) -> Result<SearchResponse> {
        let query = input.query.trim().to_string();
        if query.is_empty() {
            return Err(Error::invalid_input("query", "query cannot be empty"));
        }
        validate_max_results(&self.ctx, input.max_results)?;

        let sources = match input.sources.as_deref().map(normalize_sources) {
            Some(sources) if !sources.is_empty() => sources,
            _ => normalize_sources(&self.ctx.config().search.default_sources),
        };
        let handles = self.ctx.orchestrator().select(&sources)?;
        if let Some(handle) = handles.iter().find(|h| !h.capabilities().search) {
            return Err(Error::invalid_input(
                "sources",
                format!("source '{}' does not support keyword search", handle.name),
            ));
        }

        let fingerprint = Self::fingerprint(&query, &sources, input.max_results, input.strategy);
        let ctx = &self.ctx;
        let strategy = input.strategy;
        let max_results = input.max_results;

        let lookup = ctx
            .cache()
            .get_or_compute(&fingerprint, || async {
                let scope = ctx.request_scope();
                let outcome = ctx
                    .orchestrator()
                    .fan_out(&handles, &scope, "search", |adapter| {
                        let query = query.clone();
                        async move { adapter.search(&query, max_results).await }
                    })
                    .await
                    .into_result("search")?;

                let (raw, report) = SourceReport::from_fan_out(ctx, outcome);
                let records = ctx.merge_engine().merge(raw, strategy);
                Ok(SearchPayload { records, report })
            })
            .await?;

        let SearchPayload { records, report } = lookup.value;
        info!(
            "Search '{}' returned {} records from [{}] (cache_hit={})",
            query,
            records.len(),
            report.sources_used.join(", "),
            lookup.cache_hit
        );

        Ok(SearchResponse {
            query,
            strategy,
            total: records.len(),
            records,
            sources_used: report.sources_used,
            sources_failed: report.sources_failed,
            cache_hit: lookup.cache_hit,
            source_stats: report.source_stats,
        })
    }

    /// Same keyword, sources (in any order) and limits hash identically
    pub(crate) fn fingerprint(
        query: &str,
        sources: &[String],
        max_results: u32,
        strategy: Strategy,
    ) -> Fingerprint {
        FingerprintBuilder::new("search")
            .text("query", query)
            .set("sources", sources)
            .field("max_results", max_results)
            .field("strategy", strategy)
            .finish()
    }
}
