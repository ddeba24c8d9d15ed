//! Scripted sources shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use research_aggregator::client::providers::{
    AdapterCapabilities, AdapterError, QualityProvider, SourceAdapter,
};
use research_aggregator::{
    Config, Identifier, IdentifierKind, QualityMetrics, RawRecord, ResultCache, ServiceContext,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Adapter that answers from fixed data, optionally after a delay or with a
/// fixed error, and counts every call
#[derive(Default)]
pub struct MockSource {
    pub name: String,
    pub capabilities: AdapterCapabilities,
    pub delay: Duration,
    pub failure: Option<AdapterError>,
    pub search_results: Vec<RawRecord>,
    pub details: Option<RawRecord>,
    pub references: Vec<RawRecord>,
    pub citing: Vec<RawRecord>,
    pub similar: Vec<RawRecord>,
    pub conversions: HashMap<IdentifierKind, Identifier>,
    pub search_calls: AtomicU32,
    pub details_calls: AtomicU32,
    pub relation_calls: AtomicU32,
    pub convert_calls: AtomicU32,
}

impl MockSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capabilities: AdapterCapabilities {
                search: true,
                ..AdapterCapabilities::default()
            },
            ..Self::default()
        }
    }

    pub fn with_search(mut self, records: Vec<RawRecord>) -> Self {
        self.search_results = records;
        self
    }

    pub fn with_details(mut self, accepts: &[IdentifierKind], record: RawRecord) -> Self {
        self.capabilities.details = accepts.to_vec();
        self.details = Some(record);
        self
    }

    pub fn with_references(mut self, accepts: &[IdentifierKind], records: Vec<RawRecord>) -> Self {
        self.capabilities.references = accepts.to_vec();
        self.references = records;
        self
    }

    pub fn with_citing(mut self, accepts: &[IdentifierKind], records: Vec<RawRecord>) -> Self {
        self.capabilities.citing = accepts.to_vec();
        self.citing = records;
        self
    }

    pub fn with_similar(mut self, accepts: &[IdentifierKind], records: Vec<RawRecord>) -> Self {
        self.capabilities.similar = accepts.to_vec();
        self.similar = records;
        self
    }

    pub fn with_conversion(mut self, target: Identifier) -> Self {
        self.capabilities.converts_identifiers = true;
        self.conversions.insert(target.kind, target);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, error: AdapterError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn searches(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn detail_lookups(&self) -> u32 {
        self.details_calls.load(Ordering::SeqCst)
    }

    pub fn relation_lookups(&self) -> u32 {
        self.relation_calls.load(Ordering::SeqCst)
    }

    async fn answer<T>(&self, value: T) -> Result<T, AdapterError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(value),
        }
    }

    fn tagged(&self, records: &[RawRecord], max_results: u32) -> Vec<RawRecord> {
        records
            .iter()
            .take(max_results as usize)
            .cloned()
            .map(|mut r| {
                r.source = self.name.clone();
                r
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted source"
    }

    fn capabilities(&self) -> AdapterCapabilities {
        self.capabilities.clone()
    }

    async fn search(&self, _query: &str, max_results: u32) -> Result<Vec<RawRecord>, AdapterError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(self.tagged(&self.search_results, max_results)).await
    }

    async fn fetch_details(&self, id: &Identifier) -> Result<RawRecord, AdapterError> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        let mut record = self
            .details
            .clone()
            .ok_or_else(|| AdapterError::NotFound(id.to_string()))?;
        record.source = self.name.clone();
        self.answer(record).await
    }

    async fn fetch_references(
        &self,
        _id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        self.relation_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(self.tagged(&self.references, max_results)).await
    }

    async fn fetch_citing(
        &self,
        _id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        self.relation_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(self.tagged(&self.citing, max_results)).await
    }

    async fn fetch_similar(
        &self,
        _id: &Identifier,
        max_results: u32,
    ) -> Result<Vec<RawRecord>, AdapterError> {
        self.relation_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(self.tagged(&self.similar, max_results)).await
    }

    async fn convert_identifier(
        &self,
        _id: &Identifier,
        target: IdentifierKind,
    ) -> Result<Option<Identifier>, AdapterError> {
        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        self.answer(self.conversions.get(&target).cloned()).await
    }
}

/// Quality provider answering from a fixed journal table
pub struct MockQuality {
    pub name: String,
    pub journals: HashMap<String, QualityMetrics>,
    pub calls: AtomicU32,
    pub transient_failures: u32,
}

impl MockQuality {
    pub fn new(name: &str, journals: Vec<QualityMetrics>) -> Self {
        Self {
            name: name.to_string(),
            journals: journals
                .into_iter()
                .map(|mut m| {
                    m.data_sources = vec![name.to_string()];
                    (m.journal_name.to_lowercase(), m)
                })
                .collect(),
            calls: AtomicU32::new(0),
            transient_failures: 0,
        }
    }

    /// Answer the first `n` calls with a 503
    pub fn with_transient_failures(mut self, n: u32) -> Self {
        self.transient_failures = n;
        self
    }
}

#[async_trait]
impl QualityProvider for MockQuality {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_metrics(&self, journal_name: &str) -> Result<QualityMetrics, AdapterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.transient_failures {
            return Err(AdapterError::Server {
                status: 503,
                message: "busy".to_string(),
            });
        }
        self.journals
            .get(&journal_name.to_lowercase())
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(journal_name.to_string()))
    }
}

pub fn record(doi: Option<&str>, title: &str, date: &str) -> RawRecord {
    RawRecord {
        title: Some(title.to_string()),
        doi: doi.map(str::to_string),
        publication_date: Some(date.to_string()),
        authors: vec!["Jane Doe".to_string()],
        ..RawRecord::new("mock")
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.cache.memory_only = true;
    config
}

pub fn context(sources: Vec<Arc<MockSource>>, quality: Vec<Arc<MockQuality>>) -> Arc<ServiceContext> {
    let mut builder = ServiceContext::builder(test_config())
        .with_cache(ResultCache::in_memory(Duration::from_secs(3600)));
    for source in sources {
        builder = builder.with_adapter(source);
    }
    for provider in quality {
        builder = builder.with_quality_provider(provider);
    }
    Arc::new(builder.build().expect("context builds"))
}
