use super::{Identifier, IdentifierKind};
use crate::client::providers::SourceFailure;
use crate::client::Orchestrator;
use crate::merge::MergePolicy;
use crate::repositories::{FingerprintBuilder, ResultCache};
use crate::resilience::RequestScope;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Outcome of [`IdentityResolver::resolve_all`]
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub identifiers: BTreeMap<IdentifierKind, Identifier>,
    /// Kinds left unmapped because no conversion source answered
    pub failures: BTreeMap<IdentifierKind, Vec<SourceFailure>>,
}

impl Resolution {
    #[must_use]
    pub fn get(&self, kind: IdentifierKind) -> Option<&Identifier> {
        self.identifiers.get(&kind)
    }
}

/// Cross-maps identifiers between kinds using the conversion-capable sources.
///
/// Mappings are cached in the shared result cache, so a DOI resolved once for
/// a details lookup is free for the references lookup that follows.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    orchestrator: Arc<Orchestrator>,
    cache: Arc<ResultCache>,
    policy: MergePolicy,
}

impl IdentityResolver {
    #[must_use]
    pub const fn new(
        orchestrator: Arc<Orchestrator>,
        cache: Arc<ResultCache>,
        policy: MergePolicy,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            policy,
        }
    }

    /// Map `id` onto `target`. Same-kind requests return `id` unchanged;
    /// otherwise the first conversion in source-priority order wins.
    #[instrument(skip(self, scope), fields(request_id = %scope.request_id))]
    pub async fn resolve(
        &self,
        id: &Identifier,
        target: IdentifierKind,
        scope: &RequestScope,
    ) -> Result<Identifier> {
        if !id.is_known() || target == IdentifierKind::Unknown {
            return Err(Error::invalid_input(
                "identifier",
                format!("cannot resolve {id} to {target}"),
            ));
        }
        if id.kind == target {
            return Ok(id.clone());
        }

        let fingerprint = FingerprintBuilder::new("resolve")
            .field("kind", id.kind)
            .field("value", &id.value)
            .field("target", target)
            .finish();

        let lookup = self
            .cache
            .get_or_compute(&fingerprint, || self.convert(id, target, scope))
            .await?;
        debug!("Resolved {} -> {} (cache_hit={})", id, lookup.value, lookup.cache_hit);
        Ok(lookup.value)
    }

    /// Resolve `id` into every kind in `kinds` that can be reached. Kinds that
    /// cannot be mapped are left out rather than failing the whole call; when
    /// that is because the conversion sources failed, their failures are kept.
    pub async fn resolve_all(
        &self,
        id: &Identifier,
        kinds: &[IdentifierKind],
        scope: &RequestScope,
    ) -> Result<Resolution> {
        let mut resolution = Resolution::default();
        resolution.identifiers.insert(id.kind, id.clone());

        for &kind in kinds {
            if resolution.identifiers.contains_key(&kind) || kind == IdentifierKind::Unknown {
                continue;
            }
            match self.resolve(id, kind, scope).await {
                Ok(mapped) => {
                    resolution.identifiers.insert(kind, mapped);
                }
                Err(Error::NotFound { .. }) => {
                    debug!("No {} mapping for {}", kind, id);
                }
                Err(Error::Aggregation { failures, .. }) => {
                    debug!("{} -> {} unavailable: {} source(s) failed", id, kind, failures.len());
                    resolution.failures.insert(kind, failures);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resolution)
    }

    /// `NotFound` when the sources answered without a mapping, `Aggregation`
    /// when none of them answered at all
    async fn convert(
        &self,
        id: &Identifier,
        target: IdentifierKind,
        scope: &RequestScope,
    ) -> Result<Identifier> {
        let handles = self.orchestrator.capable(|caps| caps.converts_identifiers);
        let outcome = self
            .orchestrator
            .fan_out(&handles, scope, "convert_identifier", |adapter| {
                let id = id.clone();
                async move { adapter.convert_identifier(&id, target).await }
            })
            .await;

        if outcome.successes.is_empty() && !outcome.failures.is_empty() {
            return Err(Error::Aggregation {
                operation: format!("convert {id} to {target}"),
                failures: outcome.failures,
            });
        }

        let mut hits: Vec<(String, Identifier)> = outcome
            .successes
            .into_iter()
            .filter_map(|(source, mapped)| mapped.map(|m| (source, m)))
            .collect();
        hits.sort_by(|a, b| self.policy.compare_sources(&a.0, &b.0));

        hits.into_iter()
            .next()
            .map(|(source, mapped)| {
                debug!("{} mapped {} to {}", source, id, mapped);
                mapped
            })
            .ok_or_else(|| Error::NotFound {
                what: format!("{target} for {id}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::providers::{AdapterCapabilities, AdapterError, ErrorKind, SourceAdapter};
    use crate::client::{RawRecord, SourceHandle};
    use crate::resilience::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Converter {
        name: &'static str,
        answer: Option<&'static str>,
        failure: Option<AdapterError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SourceAdapter for Converter {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test converter"
        }

        fn capabilities(&self) -> AdapterCapabilities {
            AdapterCapabilities {
                converts_identifiers: true,
                ..Default::default()
            }
        }

        async fn search(&self, _query: &str, _max: u32) -> std::result::Result<Vec<RawRecord>, AdapterError> {
            Ok(Vec::new())
        }

        async fn fetch_details(&self, _id: &Identifier) -> std::result::Result<RawRecord, AdapterError> {
            Err(AdapterError::NotFound("n/a".to_string()))
        }

        async fn convert_identifier(
            &self,
            _id: &Identifier,
            target: IdentifierKind,
        ) -> std::result::Result<Option<Identifier>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = &self.failure {
                return Err(failure.clone());
            }
            Ok(self.answer.map(|v| Identifier::new(target, v)))
        }
    }

    fn resolver(adapters: Vec<Arc<Converter>>) -> IdentityResolver {
        let mut orchestrator = Orchestrator::new();
        for adapter in adapters {
            orchestrator.register(SourceHandle::new(
                adapter,
                1000.0,
                4,
                RetryPolicy::no_retry(),
                Duration::from_secs(5),
            ));
        }
        IdentityResolver::new(
            Arc::new(orchestrator),
            Arc::new(ResultCache::in_memory(Duration::from_secs(60))),
            MergePolicy::new(["europe_pmc", "pubmed"]),
        )
    }

    fn converter(name: &'static str, answer: Option<&'static str>) -> Arc<Converter> {
        Arc::new(Converter {
            name,
            answer,
            failure: None,
            calls: AtomicU32::new(0),
        })
    }

    fn broken_converter(name: &'static str, failure: AdapterError) -> Arc<Converter> {
        Arc::new(Converter {
            name,
            answer: None,
            failure: Some(failure),
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn test_same_kind_is_identity() {
        let resolver = resolver(Vec::new());
        let id = Identifier::new(IdentifierKind::Pmid, "123");
        let scope = RequestScope::new(Duration::from_secs(5));
        assert_eq!(resolver.resolve(&id, IdentifierKind::Pmid, &scope).await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_priority_order_wins_and_is_cached() {
        let pubmed = converter("pubmed", Some("10.1/from-pubmed"));
        let europe = converter("europe_pmc", Some("10.1/from-europe"));
        let resolver = resolver(vec![Arc::clone(&pubmed), Arc::clone(&europe)]);
        let id = Identifier::new(IdentifierKind::Pmid, "123");
        let scope = RequestScope::new(Duration::from_secs(5));

        let doi = resolver.resolve(&id, IdentifierKind::Doi, &scope).await.unwrap();
        assert_eq!(doi.value, "10.1/from-europe");

        let again = resolver.resolve(&id, IdentifierKind::Doi, &scope).await.unwrap();
        assert_eq!(again, doi);
        assert_eq!(europe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pubmed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_mapping_is_not_found() {
        let resolver = resolver(vec![converter("pubmed", None)]);
        let id = Identifier::new(IdentifierKind::Doi, "10.1/x");
        let scope = RequestScope::new(Duration::from_secs(5));

        let err = resolver.resolve(&id, IdentifierKind::Pmcid, &scope).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        let all = resolver
            .resolve_all(&id, &[IdentifierKind::Doi, IdentifierKind::Pmcid], &scope)
            .await
            .unwrap();
        assert_eq!(all.identifiers.len(), 1);
        assert!(all.get(IdentifierKind::Doi).is_some());
        assert!(all.failures.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_outage_is_not_reported_as_missing() {
        let resolver = resolver(vec![
            broken_converter("pubmed", AdapterError::Timeout),
            broken_converter(
                "europe_pmc",
                AdapterError::Server {
                    status: 503,
                    message: "down".to_string(),
                },
            ),
        ]);
        let id = Identifier::new(IdentifierKind::Pmid, "123");
        let scope = RequestScope::new(Duration::from_secs(5));

        let err = resolver.resolve(&id, IdentifierKind::Doi, &scope).await.unwrap_err();
        assert_eq!(err.error_type(), "AggregationError");

        let all = resolver
            .resolve_all(&id, &[IdentifierKind::Doi], &scope)
            .await
            .unwrap();
        assert!(all.get(IdentifierKind::Doi).is_none());
        let failures = &all.failures[&IdentifierKind::Doi];
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().any(|f| f.kind == ErrorKind::Timeout));
        assert!(failures.iter().any(|f| f.kind == ErrorKind::ServerError));
    }

    #[tokio::test]
    async fn test_one_source_answering_without_mapping_is_not_found() {
        let resolver = resolver(vec![
            converter("pubmed", None),
            broken_converter("europe_pmc", AdapterError::Timeout),
        ]);
        let id = Identifier::new(IdentifierKind::Pmid, "123");
        let scope = RequestScope::new(Duration::from_secs(5));

        let err = resolver.resolve(&id, IdentifierKind::Doi, &scope).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_rejected() {
        let resolver = resolver(Vec::new());
        let id = Identifier::new(IdentifierKind::Unknown, "???");
        let scope = RequestScope::new(Duration::from_secs(5));
        assert!(matches!(
            resolver.resolve(&id, IdentifierKind::Doi, &scope).await,
            Err(Error::InvalidInput { .. })
        ));
    }
}
