//! # Aggregation Engine
//!
//! The public surface: one method per operation, each delegating to its
//! tool over a shared [`ServiceContext`].
//!
//! ```no_run
//! use research_aggregator::{AggregationEngine, Config};
//! use research_aggregator::tools::SearchInput;
//!
//! # async fn example() -> research_aggregator::Result<()> {
//! let engine = AggregationEngine::from_config(Config::default())?;
//! let response = engine.search(SearchInput::new("CRISPR off-target")).await?;
//! println!("{} records from {:?}", response.total, response.sources_used);
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::di::ServiceContext;
use crate::repositories::CacheStats;
use crate::tools::export::export_to_file;
use crate::tools::{
    BatchDetailsInput, BatchDetailsResponse, BatchExport, BatchSearchInput, BatchSearchResponse,
    BatchTool, DetailsInput, DetailsResponse, DetailsTool, ExportOptions, ExportSummary,
    QualityInput, QualityResponse, QualityTool, ReferencesInput, ReferencesResponse,
    ReferencesTool, RelationsInput, RelationsResponse, RelationsTool, SearchInput, SearchResponse,
    SearchTool,
};
use crate::Result;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct AggregationEngine {
    ctx: Arc<ServiceContext>,
    search: SearchTool,
    details: DetailsTool,
    references: ReferencesTool,
    relations: RelationsTool,
    quality: QualityTool,
    batch: BatchTool,
}

impl AggregationEngine {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            search: SearchTool::new(Arc::clone(&ctx)),
            details: DetailsTool::new(Arc::clone(&ctx)),
            references: ReferencesTool::new(Arc::clone(&ctx)),
            relations: RelationsTool::new(Arc::clone(&ctx)),
            quality: QualityTool::new(Arc::clone(&ctx)),
            batch: BatchTool::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    /// Wire live adapters from `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let ctx = ServiceContext::from_config(config)?;
        info!(
            "Aggregation engine ready with sources [{}]",
            ctx.orchestrator().source_names().join(", ")
        );
        Ok(Self::new(Arc::new(ctx)))
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.ctx
    }

    /// Keyword search across sources, merged under the requested strategy
    pub async fn search(&self, input: SearchInput) -> Result<SearchResponse> {
        self.search.execute(input).await
    }

    /// One work, consolidated across every source that knows it
    pub async fn get_details(&self, input: DetailsInput) -> Result<DetailsResponse> {
        self.details.execute(input).await
    }

    pub async fn get_references(&self, input: ReferencesInput) -> Result<ReferencesResponse> {
        self.references.execute(input).await
    }

    pub async fn get_relations(&self, input: RelationsInput) -> Result<RelationsResponse> {
        self.relations.execute(input).await
    }

    pub async fn get_quality(&self, input: QualityInput) -> Result<QualityResponse> {
        self.quality.execute(input).await
    }

    /// Several keyword searches, with their records merged into one list
    pub async fn batch_search(&self, input: BatchSearchInput) -> Result<BatchSearchResponse> {
        self.batch.search(input).await
    }

    pub async fn batch_details(&self, input: BatchDetailsInput) -> Result<BatchDetailsResponse> {
        self.batch.details(input).await
    }

    /// Write batch results to disk as JSON or CSV
    pub async fn export<T: BatchExport>(
        &self,
        results: &T,
        options: &ExportOptions,
    ) -> Result<ExportSummary> {
        export_to_file(results, options).await
    }

    /// Drop expired cache entries, or every entry when `all` is set.
    /// Returns how many entries were removed, if known.
    #[instrument(skip(self))]
    pub async fn purge_cache(&self, all: bool) -> Result<Option<usize>> {
        if all {
            self.ctx.cache().clear().await?;
            Ok(None)
        } else {
            self.ctx.cache().purge_expired().await.map(Some)
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.ctx.cache().stats().await
    }

    /// Cancel every in-flight request scope
    pub fn shutdown(&self) {
        self.ctx.shutdown();
    }
}
