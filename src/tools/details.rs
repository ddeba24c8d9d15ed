use super::quality::QualityTool;
use super::{normalize_sources, IdPlan, SourceReport};
use crate::client::providers::{IdOperation, SourceFailure};
use crate::client::SourceStat;
use crate::di::ServiceContext;
use crate::identity::{parse_identifier, Identifier, IdentifierKind};
use crate::merge::quality::QualityMetrics;
use crate::merge::CanonicalRecord;
use crate::repositories::FingerprintBuilder;
use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Input parameters for a single-work lookup
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetailsInput {
    /// DOI, PMID, PMCID or arXiv id, with or without a prefix
    pub identifier: String,
    /// Expected identifier kind; a mismatch with the classified kind is rejected
    #[serde(default)]
    pub id_type: Option<IdentifierKind>,
    /// Restrict the lookup to these sources
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    /// Attach journal quality metrics for the record's journal
    #[serde(default)]
    pub include_quality: bool,
}

impl DetailsInput {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            id_type: None,
            sources: None,
            include_quality: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetailsResponse {
    pub identifier: Identifier,
    /// Every source's view of the work folded into one record
    pub record: CanonicalRecord,
    /// Sources that returned the work, in priority order
    pub sources_found: Vec<String>,
    pub sources_failed: Vec<SourceFailure>,
    pub quality: Option<QualityMetrics>,
    pub cache_hit: bool,
    pub source_stats: Vec<SourceStat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DetailsPayload {
    record: CanonicalRecord,
    report: SourceReport,
}

/// Fetch one work from every source that knows it and consolidate
#[derive(Debug, Clone)]
pub struct DetailsTool {
    ctx: Arc<ServiceContext>,
    quality: QualityTool,
}

impl DetailsTool {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self {
            quality: QualityTool::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    #[instrument(skip(self, input), fields(identifier = %input.identifier))]
    pub async fn execute(&self, input: DetailsInput) -> Result<DetailsResponse> {
        let identifier = parse_identifier(&input.identifier, input.id_type)?;
        let sources = input.sources.as_deref().map(normalize_sources);

        let fingerprint = FingerprintBuilder::new("details")
            .field("kind", identifier.kind)
            .field("value", &identifier.value)
            .set("sources", sources.iter().flatten())
            .finish();

        let ctx = &self.ctx;
        let id = &identifier;
        let lookup = ctx
            .cache()
            .get_or_compute(&fingerprint, || async {
                let scope = ctx.request_scope();
                let plan =
                    IdPlan::build(ctx, id, IdOperation::Details, sources.as_deref(), &scope).await?;
                let outcome = plan
                    .run(ctx, &scope, "details", |adapter, target| async move {
                        adapter.fetch_details(&target).await.map(|record| vec![record])
                    })
                    .await
                    .into_result("details")?;

                let (raw, report) = SourceReport::from_fan_out(ctx, outcome);
                let record = ctx
                    .merge_engine()
                    .consolidate(raw)
                    .ok_or_else(|| Error::NotFound {
                        what: format!("details for {id}"),
                    })?;
                Ok(DetailsPayload { record, report })
            })
            .await?;

        let DetailsPayload { record, report } = lookup.value;
        info!(
            "Details for {} found in [{}] (cache_hit={})",
            identifier,
            report.sources_used.join(", "),
            lookup.cache_hit
        );

        let quality = if input.include_quality {
            self.journal_quality(&record).await
        } else {
            None
        };

        Ok(DetailsResponse {
            identifier,
            record,
            sources_found: report.sources_used,
            sources_failed: report.sources_failed,
            quality,
            cache_hit: lookup.cache_hit,
            source_stats: report.source_stats,
        })
    }

    /// Quality enrichment is best-effort: a lookup failure leaves it empty
    async fn journal_quality(&self, record: &CanonicalRecord) -> Option<QualityMetrics> {
        let journal = record.journal.as_deref()?;
        match self.quality.metrics_for(journal).await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!("Quality lookup for '{}' failed: {}", journal, e);
                None
            }
        }
    }
}
