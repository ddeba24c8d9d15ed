//! Service context
//!
//! Everything the engine needs is built once, up front, into a
//! [`ServiceContext`] and shared by reference. There is no global registry:
//! tests assemble a context from mock adapters with [`ServiceContextBuilder`],
//! the binary assembles one from [`Config`] with [`ServiceContext::from_config`].
//!
//! # Example
//!
//! ```no_run
//! use research_aggregator::{Config, ServiceContext};
//!
//! # fn main() -> research_aggregator::Result<()> {
//! let ctx = ServiceContext::from_config(Config::default())?;
//! assert!(!ctx.orchestrator().source_names().is_empty());
//! # Ok(())
//! # }
//! ```

use crate::client::providers::{
    ArxivAdapter, CrossrefAdapter, EasyScholarProvider, EuropePmcAdapter, OpenAlexAdapter,
    PubMedAdapter, QualityProvider, SourceAdapter, ARXIV, CROSSREF, EASYSCHOLAR, EUROPE_PMC,
    OPENALEX, PUBMED,
};
use crate::client::{HttpClientConfig, Orchestrator, QualityHandle, SourceHandle};
use crate::config::{Config, SourceConfig};
use crate::identity::IdentityResolver;
use crate::merge::{MergeEngine, MergePolicy};
use crate::repositories::ResultCache;
use crate::resilience::RequestScope;
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Shared, immutable wiring for one running engine
pub struct ServiceContext {
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator>,
    cache: Arc<ResultCache>,
    merge: MergeEngine,
    resolver: IdentityResolver,
    quality_providers: Vec<QualityHandle>,
    shutdown: CancellationToken,
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("sources", &self.orchestrator.source_names())
            .field("cache", &self.cache)
            .field(
                "quality_providers",
                &self
                    .quality_providers
                    .iter()
                    .map(|p| p.name.clone())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl ServiceContext {
    /// Validate `config` and wire the live provider adapters
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let http = HttpClientConfig::default().build()?;

        let mut builder = ServiceContextBuilder::new(config.clone());

        if let Some(source) = config.source(EUROPE_PMC) {
            let mut adapter = EuropePmcAdapter::new(http.clone());
            if let Some(url) = &source.base_url {
                adapter = adapter.with_base_url(url);
            }
            builder = builder.with_adapter(Arc::new(adapter));
        }

        if let Some(source) = config.source(PUBMED) {
            let mut adapter = PubMedAdapter::new(http.clone())
                .with_api_key(source.api_key.clone())
                .with_email(source.email.clone());
            if let Some(url) = &source.base_url {
                adapter = adapter.with_base_url(url);
            }
            builder = builder.with_adapter(Arc::new(adapter));
        }

        if let Some(source) = config.source(CROSSREF) {
            let mut adapter = CrossrefAdapter::new(http.clone()).with_mailto(source.email.clone());
            if let Some(url) = &source.base_url {
                adapter = adapter.with_base_url(url);
            }
            builder = builder.with_adapter(Arc::new(adapter));
        }

        // EasyScholar goes first so its JCR figures win over OpenAlex's
        if let Some(source) = config.source(EASYSCHOLAR) {
            let mut provider = EasyScholarProvider::new(http.clone(), source.api_key.clone());
            if let Some(url) = &source.base_url {
                provider = provider.with_base_url(url);
            }
            if provider.is_configured() {
                builder = builder.with_quality_provider(Arc::new(provider));
            } else {
                debug!("EasyScholar enabled without an API key; skipping");
            }
        }

        if let Some(source) = config.source(OPENALEX) {
            let mut adapter = OpenAlexAdapter::new(http.clone()).with_mailto(source.email.clone());
            if let Some(url) = &source.base_url {
                adapter = adapter.with_base_url(url);
            }
            let adapter = Arc::new(adapter);
            builder = builder
                .with_adapter(Arc::clone(&adapter) as Arc<dyn SourceAdapter>)
                .with_quality_provider(adapter);
        }

        if let Some(source) = config.source(ARXIV) {
            let mut adapter = ArxivAdapter::new(http);
            if let Some(url) = &source.base_url {
                adapter = adapter.with_base_url(url);
            }
            builder = builder.with_adapter(Arc::new(adapter));
        }

        builder.build()
    }

    #[must_use]
    pub fn builder(config: Config) -> ServiceContextBuilder {
        ServiceContextBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    #[must_use]
    pub const fn merge_engine(&self) -> &MergeEngine {
        &self.merge
    }

    #[must_use]
    pub const fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    #[must_use]
    pub fn quality_providers(&self) -> &[QualityHandle] {
        &self.quality_providers
    }

    /// Fresh request scope: configured deadline, cancelled with the context
    #[must_use]
    pub fn request_scope(&self) -> RequestScope {
        RequestScope::with_cancel(
            self.config.orchestrator.request_deadline(),
            self.shutdown.child_token(),
        )
    }

    /// Cancel every in-flight and future request scope
    pub fn shutdown(&self) {
        info!("Cancelling outstanding requests");
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Incremental assembly of a [`ServiceContext`]
pub struct ServiceContextBuilder {
    config: Config,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    quality_providers: Vec<Arc<dyn QualityProvider>>,
    cache: Option<ResultCache>,
    shutdown: Option<CancellationToken>,
}

impl ServiceContextBuilder {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            adapters: Vec::new(),
            quality_providers: Vec::new(),
            cache: None,
            shutdown: None,
        }
    }

    /// Register a source adapter. Rate, concurrency, retry and timeout come
    /// from `sources.<name>` in the config, or the defaults when absent.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Register a quality provider; earlier providers win field conflicts
    #[must_use]
    pub fn with_quality_provider(mut self, provider: Arc<dyn QualityProvider>) -> Self {
        self.quality_providers.push(provider);
        self
    }

    /// Use this cache instead of the one described by `cache.*`
    #[must_use]
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn build(self) -> Result<ServiceContext> {
        let Self {
            config,
            adapters,
            quality_providers,
            cache,
            shutdown,
        } = self;

        let source_config = |name: &str| {
            config
                .sources
                .get(name)
                .cloned()
                .unwrap_or_else(SourceConfig::default)
        };

        let mut orchestrator = Orchestrator::new();
        for adapter in adapters {
            let source = source_config(adapter.name());
            debug!(
                "Registering source {} ({} req/s, {} concurrent)",
                adapter.name(),
                source.requests_per_second,
                source.max_concurrent
            );
            orchestrator.register(SourceHandle::new(
                adapter,
                source.requests_per_second,
                source.max_concurrent,
                source.retry.to_policy(),
                source.timeout(&config.orchestrator),
            ));
        }

        // A provider that is also a registered adapter shares its throttling
        let quality_providers: Vec<QualityHandle> = quality_providers
            .into_iter()
            .map(|provider| match orchestrator.handle(provider.name()) {
                Some(handle) => QualityHandle::sharing(provider, handle),
                None => {
                    let source = source_config(provider.name());
                    QualityHandle::new(
                        provider,
                        source.requests_per_second,
                        source.max_concurrent,
                        source.retry.to_policy(),
                        source.timeout(&config.orchestrator),
                    )
                }
            })
            .collect();

        let cache = match cache {
            Some(cache) => cache,
            None if !config.cache.enabled => ResultCache::disabled(),
            None => match config.cache.store_path() {
                Some(path) => ResultCache::open(path, config.cache.ttl())?,
                None => ResultCache::in_memory(config.cache.ttl()),
            },
        };

        let orchestrator = Arc::new(orchestrator);
        let cache = Arc::new(cache);
        let policy = MergePolicy::new(config.merge.source_priority.iter().cloned());
        let resolver =
            IdentityResolver::new(Arc::clone(&orchestrator), Arc::clone(&cache), policy.clone());

        info!(
            "Service context ready: sources [{}], {} quality provider(s)",
            orchestrator.source_names().join(", "),
            quality_providers.len()
        );

        Ok(ServiceContext {
            config: Arc::new(config),
            orchestrator,
            cache,
            merge: MergeEngine::new(policy),
            resolver,
            quality_providers,
            shutdown: shutdown.unwrap_or_default(),
        })
    }
}
