//! Request handlers behind the aggregation engine.
//!
//! Each tool owns one operation: it validates its input, builds the request
//! fingerprint, and on a cache miss plans and runs the fan-out. Identifier
//! based tools share the planning helpers below.

pub mod batch;
pub mod details;
pub mod export;
pub mod quality;
pub mod references;
pub mod relations;
pub mod search;

pub use batch::{
    BatchDetailsInput, BatchDetailsResponse, BatchItemError, BatchSearchInput,
    BatchSearchResponse, BatchTool, DetailsResult, QueryResult,
};
pub use details::{DetailsInput, DetailsResponse, DetailsTool};
pub use export::{BatchExport, ExportFormat, ExportOptions, ExportSummary};
pub use quality::{JournalFailure, QualityInput, QualityResponse, QualityTool};
pub use references::{ReferencesInput, ReferencesResponse, ReferencesTool};
pub use relations::{
    AnalysisType, NetworkAnalysis, NodeKind, RelationSet, RelationStatistics, RelationType,
    RelationsInput, RelationsResponse, RelationsTool, SeedFailure, SeedIdentifiers,
    SeedRelations,
};
pub use search::{SearchInput, SearchResponse, SearchTool};

use crate::client::providers::{AdapterError, ErrorKind, IdOperation, SourceAdapter, SourceFailure};
use crate::client::{FanOutResult, RawRecord, SourceHandle, SourceStat};
use crate::di::ServiceContext;
use crate::identity::{Identifier, IdentifierKind};
use crate::resilience::RequestScope;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

pub(crate) fn default_max_results() -> u32 {
    10
}

/// Check a caller-supplied result cap against the configured limit
pub(crate) fn validate_max_results(ctx: &ServiceContext, max_results: u32) -> Result<()> {
    let limit = ctx.config().search.max_results_limit;
    if max_results == 0 || max_results > limit {
        return Err(Error::invalid_input(
            "max_results",
            format!("must be between 1 and {limit}"),
        ));
    }
    Ok(())
}

/// Sorted, de-duplicated source list with blanks removed
pub(crate) fn normalize_sources(sources: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = sources
        .iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Which sources run an identifier-based operation, with which identifier,
/// and which were ruled out before any call was made
#[derive(Debug, Default)]
pub(crate) struct IdPlan {
    handles: Vec<SourceHandle>,
    identifiers: HashMap<String, Identifier>,
    skipped: Vec<SourceFailure>,
}

impl IdPlan {
    /// Resolve `id` into a kind each candidate source accepts for `operation`.
    ///
    /// With an explicit source list unknown names are an input error; without
    /// one every source capable of the operation is a candidate.
    pub(crate) async fn build(
        ctx: &ServiceContext,
        id: &Identifier,
        operation: IdOperation,
        sources: Option<&[String]>,
        scope: &RequestScope,
    ) -> Result<Self> {
        let candidates = match sources {
            Some(names) if !names.is_empty() => ctx.orchestrator().select(names)?,
            _ => ctx.orchestrator().capable(|caps| caps.supports(operation)),
        };

        let mut needed: Vec<IdentifierKind> = Vec::new();
        for handle in &candidates {
            let accepted = handle.capabilities().identifiers_for(operation).to_vec();
            if !accepted.contains(&id.kind) {
                for kind in accepted {
                    if !needed.contains(&kind) {
                        needed.push(kind);
                    }
                }
            }
        }
        let resolved = ctx.resolver().resolve_all(id, &needed, scope).await?;

        let mut plan = Self::default();
        for handle in candidates {
            let caps = handle.capabilities();
            let accepted = caps.identifiers_for(operation);
            if accepted.is_empty() {
                plan.skipped.push(SourceFailure {
                    source: handle.name.clone(),
                    kind: ErrorKind::NotSupported,
                    message: format!("{} does not support {:?}", handle.name, operation),
                });
                continue;
            }

            let chosen = if accepted.contains(&id.kind) {
                Some(id.clone())
            } else {
                accepted.iter().find_map(|kind| resolved.get(*kind).cloned())
            };

            match chosen {
                Some(identifier) => {
                    debug!("{} will use {} for {:?}", handle.name, identifier, operation);
                    plan.identifiers.insert(handle.name.clone(), identifier);
                    plan.handles.push(handle);
                }
                None => {
                    let kinds = accepted
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("/");
                    // an outage on the conversion side is reported as such
                    let upstream = accepted
                        .iter()
                        .filter_map(|kind| resolved.failures.get(kind))
                        .flatten()
                        .next();
                    plan.skipped.push(match upstream {
                        Some(failure) => SourceFailure {
                            source: handle.name.clone(),
                            kind: failure.kind,
                            message: format!(
                                "could not map {id} to {kinds}: {} failed: {}",
                                failure.source, failure.message
                            ),
                        },
                        None => SourceFailure {
                            source: handle.name.clone(),
                            kind: ErrorKind::NotFound,
                            message: format!("no {kinds} identifier known for {id}"),
                        },
                    });
                }
            }
        }
        Ok(plan)
    }

    /// Fan `op` out over the planned sources, each called with its own
    /// identifier. Sources ruled out during planning are reported as failures.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        ctx: &ServiceContext,
        scope: &RequestScope,
        operation: &str,
        op: F,
    ) -> FanOutResult<T>
    where
        F: Fn(Arc<dyn SourceAdapter>, Identifier) -> Fut,
        Fut: Future<Output = std::result::Result<T, AdapterError>>,
    {
        let identifiers = &self.identifiers;
        let op = &op;
        let mut outcome = ctx
            .orchestrator()
            .fan_out(&self.handles, scope, operation, |adapter| {
                let identifier = identifiers.get(adapter.name()).cloned();
                async move {
                    match identifier {
                        Some(identifier) => op(adapter, identifier).await,
                        None => Err(AdapterError::NotSupported(format!(
                            "no identifier planned for {}",
                            adapter.name()
                        ))),
                    }
                }
            })
            .await;

        for skipped in &self.skipped {
            outcome.stats.push(SourceStat {
                source: skipped.source.clone(),
                attempts: 0,
                elapsed_ms: 0,
                error: Some(skipped.kind),
            });
            outcome.failures.push(skipped.clone());
        }
        outcome.failures.sort_by(|a, b| a.source.cmp(&b.source));
        outcome.stats.sort_by(|a, b| a.source.cmp(&b.source));
        outcome
    }
}

/// Source bookkeeping carried in every cached payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SourceReport {
    pub sources_used: Vec<String>,
    pub sources_failed: Vec<SourceFailure>,
    pub source_stats: Vec<SourceStat>,
}

impl SourceReport {
    /// Split a record fan-out into the records and the per-source report;
    /// `sources_used` follows source priority
    pub(crate) fn from_fan_out(
        ctx: &ServiceContext,
        outcome: FanOutResult<Vec<RawRecord>>,
    ) -> (Vec<RawRecord>, Self) {
        let mut sources_used = outcome.succeeded_sources();
        ctx.merge_engine().policy().sort_sources(&mut sources_used);

        let records = outcome
            .successes
            .into_iter()
            .flat_map(|(_, records)| records)
            .collect();

        (
            records,
            Self {
                sources_used,
                sources_failed: outcome.failures,
                source_stats: outcome.stats,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sources() {
        let sources = vec![
            " PubMed ".to_string(),
            "europe_pmc".to_string(),
            "pubmed".to_string(),
            String::new(),
        ];
        assert_eq!(normalize_sources(&sources), vec!["europe_pmc", "pubmed"]);
    }
}
