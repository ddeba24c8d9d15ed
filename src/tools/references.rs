use super::{default_max_results, normalize_sources, validate_max_results, IdPlan, SourceReport};
use crate::client::providers::{IdOperation, SourceFailure};
use crate::client::SourceStat;
use crate::di::ServiceContext;
use crate::identity::{parse_identifier, Identifier, IdentifierKind};
use crate::merge::{CanonicalRecord, Strategy};
use crate::repositories::{FingerprintBuilder, Lookup};
use crate::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReferencesInput {
    /// DOI, PMID, PMCID or arXiv id of the citing work
    pub identifier: String,
    #[serde(default)]
    pub id_type: Option<IdentifierKind>,
    /// Cap on the merged reference list (default: 10)
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

impl ReferencesInput {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            id_type: None,
            max_results: default_max_results(),
            sources: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReferencesResponse {
    pub identifier: Identifier,
    pub references: Vec<CanonicalRecord>,
    pub total: usize,
    pub sources_used: Vec<String>,
    pub sources_failed: Vec<SourceFailure>,
    pub cache_hit: bool,
    pub source_stats: Vec<SourceStat>,
}

/// Merged related-record list for one identifier and one relation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RelatedPayload {
    pub records: Vec<CanonicalRecord>,
    pub report: SourceReport,
}

/// Merged reference list of one work
#[derive(Debug, Clone)]
pub struct ReferencesTool {
    ctx: Arc<ServiceContext>,
}

impl ReferencesTool {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, input), fields(identifier = %input.identifier))]
    pub async fn execute(&self, input: ReferencesInput) -> Result<ReferencesResponse> {
        let identifier = parse_identifier(&input.identifier, input.id_type)?;
        validate_max_results(&self.ctx, input.max_results)?;
        let sources = input.sources.as_deref().map(normalize_sources);

        let lookup = fetch_related(
            &self.ctx,
            &identifier,
            IdOperation::References,
            sources.as_deref(),
            input.max_results,
        )
        .await?;

        let RelatedPayload { records, report } = lookup.value;
        info!(
            "{} references for {} from [{}] (cache_hit={})",
            records.len(),
            identifier,
            report.sources_used.join(", "),
            lookup.cache_hit
        );

        Ok(ReferencesResponse {
            identifier,
            total: records.len(),
            references: records,
            sources_used: report.sources_used,
            sources_failed: report.sources_failed,
            cache_hit: lookup.cache_hit,
            source_stats: report.source_stats,
        })
    }
}

const fn operation_name(operation: IdOperation) -> &'static str {
    match operation {
        IdOperation::Details => "details",
        IdOperation::References => "references",
        IdOperation::Citing => "citing",
        IdOperation::Similar => "similar",
    }
}

/// Cached fan-out of one relation (references, citing or similar) with the
/// per-source lists merged and cut to `max_results`
pub(crate) async fn fetch_related(
    ctx: &ServiceContext,
    id: &Identifier,
    operation: IdOperation,
    sources: Option<&[String]>,
    max_results: u32,
) -> Result<Lookup<RelatedPayload>> {
    let name = operation_name(operation);
    let fingerprint = FingerprintBuilder::new(name)
        .field("kind", id.kind)
        .field("value", &id.value)
        .field("max_results", max_results)
        .set("sources", sources.unwrap_or_default())
        .finish();

    ctx.cache()
        .get_or_compute(&fingerprint, || async {
            let scope = ctx.request_scope();
            let plan = IdPlan::build(ctx, id, operation, sources, &scope).await?;
            let outcome = plan
                .run(ctx, &scope, name, |adapter, target| async move {
                    match operation {
                        IdOperation::References => {
                            adapter.fetch_references(&target, max_results).await
                        }
                        IdOperation::Citing => adapter.fetch_citing(&target, max_results).await,
                        IdOperation::Similar => adapter.fetch_similar(&target, max_results).await,
                        IdOperation::Details => {
                            adapter.fetch_details(&target).await.map(|record| vec![record])
                        }
                    }
                })
                .await
                .into_result(name)?;

            let (raw, report) = SourceReport::from_fan_out(ctx, outcome);
            let mut records = ctx.merge_engine().merge(raw, Strategy::Union);
            records.truncate(max_results as usize);
            Ok(RelatedPayload { records, report })
        })
        .await
}
