use crate::client::providers::{AdapterError, ErrorKind, SourceFailure};
use crate::di::ServiceContext;
use crate::merge::quality::{merge_quality, validate_sort_metric, QualityMetrics};
use crate::repositories::FingerprintBuilder;
use crate::{Error, Result};
use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::time::timeout_at;
use tracing::{debug, info, instrument, warn};

/// One journal name or a batch of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum JournalNames {
    One(String),
    Many(Vec<String>),
}

impl JournalNames {
    /// Trimmed, non-empty names; case-insensitive duplicates keep the first
    /// spelling
    fn into_names(self) -> Vec<String> {
        let raw = match self {
            Self::One(name) => vec![name],
            Self::Many(names) => names,
        };
        let mut names: Vec<String> = Vec::with_capacity(raw.len());
        for name in raw {
            let name = name.trim();
            if !name.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.to_string());
            }
        }
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QualityInput {
    pub journal: JournalNames,
    /// Metric to sort by, descending with missing values last
    #[serde(default)]
    pub sort_by: Option<String>,
}

/// A journal no provider had metrics for
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JournalFailure {
    pub journal: String,
    pub error: String,
    pub error_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QualityResponse {
    pub metrics: Vec<QualityMetrics>,
    pub failures: Vec<JournalFailure>,
    pub sorted_by: Option<String>,
}

/// Journal metrics from every quality provider, merged per journal
#[derive(Clone)]
pub struct QualityTool {
    ctx: Arc<ServiceContext>,
}

impl std::fmt::Debug for QualityTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityTool")
            .field("providers", &self.provider_names())
            .finish()
    }
}

impl QualityTool {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    fn provider_names(&self) -> Vec<String> {
        self.ctx
            .quality_providers()
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    /// Batch lookup; journals without metrics are reported, not fatal
    #[instrument(skip(self, input), fields(sort_by = ?input.sort_by))]
    pub async fn execute(&self, input: QualityInput) -> Result<QualityResponse> {
        if let Some(metric) = &input.sort_by {
            validate_sort_metric(metric)?;
        }
        let journals = input.journal.into_names();
        if journals.is_empty() {
            return Err(Error::invalid_input(
                "journal",
                "at least one journal name is required",
            ));
        }

        let outcomes = join_all(journals.iter().map(|journal| async move {
            (journal.clone(), self.metrics_for(journal).await)
        }))
        .await;

        let mut metrics = Vec::new();
        let mut failures = Vec::new();
        for (journal, outcome) in outcomes {
            match outcome {
                Ok(found) => metrics.push(found),
                Err(e) => {
                    warn!("No quality metrics for '{}': {}", journal, e);
                    failures.push(JournalFailure {
                        journal,
                        error_type: e.error_type().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Some(metric) = &input.sort_by {
            sort_by_metric(&mut metrics, metric);
        }

        info!(
            "Quality lookup: {} journals with metrics, {} without",
            metrics.len(),
            failures.len()
        );
        Ok(QualityResponse {
            metrics,
            failures,
            sorted_by: input.sort_by,
        })
    }

    /// Metrics for one journal, merged across providers in registration
    /// order. Fails when no provider has any metric for it.
    pub async fn metrics_for(&self, journal: &str) -> Result<QualityMetrics> {
        let journal = journal.trim();
        if journal.is_empty() {
            return Err(Error::invalid_input("journal", "journal name cannot be empty"));
        }

        let fingerprint = FingerprintBuilder::new("quality")
            .text("journal", journal)
            .set("providers", self.provider_names())
            .finish();

        let lookup = self
            .ctx
            .cache()
            .get_or_compute(&fingerprint, || self.query_providers(journal))
            .await?;
        debug!("Quality for '{}' (cache_hit={})", journal, lookup.cache_hit);
        Ok(lookup.value)
    }

    async fn query_providers(&self, journal: &str) -> Result<QualityMetrics> {
        let providers = self.ctx.quality_providers();
        if providers.is_empty() {
            return Err(Error::NotFound {
                what: "a configured quality provider".to_string(),
            });
        }

        let scope = self.ctx.request_scope();
        let outcomes = join_all(providers.iter().map(|provider| {
            let scope = &scope;
            async move {
                let outcome = tokio::select! {
                    biased;
                    () = scope.cancel.cancelled() => Err(SourceFailure {
                        source: provider.name.clone(),
                        kind: ErrorKind::Cancelled,
                        message: "request cancelled".to_string(),
                    }),
                    outcome = timeout_at(scope.deadline, provider.get_metrics(journal)) => {
                        let (result, attempts) = outcome.unwrap_or((Err(AdapterError::Timeout), 0));
                        debug!("{} quality for '{}' after {} attempt(s)", provider.name, journal, attempts);
                        result.map_err(|e| SourceFailure::from_error(provider.name.clone(), &e))
                    }
                };
                (provider.name.as_str(), outcome)
            }
        }))
        .await;

        let mut merged: Option<QualityMetrics> = None;
        let mut failures = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(found) => {
                    merged = Some(merge_quality(journal, merged.as_ref(), Some(&found)));
                }
                Err(failure) => {
                    debug!("{} has no metrics for '{}': {}", name, journal, failure.message);
                    failures.push(failure);
                }
            }
        }

        match merged {
            Some(metrics) if metrics.has_any_metric() => Ok(metrics),
            _ => Err(Error::Aggregation {
                operation: format!("quality for '{journal}'"),
                failures,
            }),
        }
    }
}

/// Descending by `metric`; journals missing it go last, ties by name
fn sort_by_metric(metrics: &mut [QualityMetrics], metric: &str) {
    metrics.sort_by(|a, b| {
        match (a.sort_value(metric), b.sort_value(metric)) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| a.journal_name.cmp(&b.journal_name))
    });
}
