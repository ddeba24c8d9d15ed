//! Layered configuration: built-in defaults, then an optional TOML file, then
//! `RESEARCH_AGGREGATOR__SECTION__KEY` environment overrides.

use crate::client::providers::{ARXIV, CROSSREF, EASYSCHOLAR, EUROPE_PMC, OPENALEX, PUBMED};
use crate::client::rate_limiter::MIN_REQUESTS_PER_SECOND;
use crate::resilience::RetryPolicy;
use crate::{Error, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "RESEARCH_AGGREGATOR";
const APP_DIR: &str = "research-aggregator";

/// Sources that can answer bibliographic queries
pub const BIBLIOGRAPHIC_SOURCES: [&str; 5] = [EUROPE_PMC, PUBMED, CROSSREF, OPENALEX, ARXIV];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,
    pub search: SearchConfig,
    pub merge: MergeConfig,
    pub sources: BTreeMap<String, SourceConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    /// Durable store location; ignored when `memory_only` is set
    pub path: Option<PathBuf>,
    pub memory_only: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 24 * 60 * 60,
            path: dirs::cache_dir().map(|dir| dir.join(APP_DIR).join("results")),
            memory_only: false,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Where the durable store lives, if anywhere
    #[must_use]
    pub fn store_path(&self) -> Option<&Path> {
        if self.memory_only {
            None
        } else {
            self.path.as_deref()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Bound on a whole fan-out, across every source and retry
    pub request_deadline_secs: u64,
    /// Per-attempt timeout for sources that do not set their own
    pub default_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_deadline_secs: 30,
            default_timeout_secs: 15,
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub const fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_sources: Vec<String>,
    pub default_max_results: u32,
    pub max_results_limit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_sources: vec![EUROPE_PMC.to_string(), PUBMED.to_string()],
            default_max_results: 10,
            max_results_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Sources in descending order of trust for conflicting field values
    pub source_priority: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            source_priority: BIBLIOGRAPHIC_SOURCES.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    /// Override for the provider's public endpoint
    pub base_url: Option<String>,
    pub requests_per_second: f64,
    pub max_concurrent: usize,
    /// Per-attempt timeout; falls back to the orchestrator default when 0
    pub timeout_secs: u64,
    pub retry: RetryConfig,
    pub api_key: Option<String>,
    /// Contact address for polite-pool access (Crossref, OpenAlex, NCBI)
    pub email: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            requests_per_second: 1.0,
            max_concurrent: 2,
            timeout_secs: 0,
            retry: RetryConfig::default(),
            api_key: None,
            email: None,
        }
    }
}

impl SourceConfig {
    fn with_rate(requests_per_second: f64, max_concurrent: usize) -> Self {
        Self {
            requests_per_second,
            max_concurrent,
            ..Self::default()
        }
    }

    /// Effective per-attempt timeout
    #[must_use]
    pub const fn timeout(&self, orchestrator: &OrchestratorConfig) -> Duration {
        if self.timeout_secs == 0 {
            Duration::from_secs(orchestrator.default_timeout_secs)
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: u64::try_from(policy.initial_delay.as_millis()).unwrap_or(250),
            max_delay_ms: u64::try_from(policy.max_delay.as_millis()).unwrap_or(10_000),
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `research_aggregator=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(EUROPE_PMC.to_string(), SourceConfig::with_rate(5.0, 4));
        // NCBI allows 3 req/s without an API key
        sources.insert(PUBMED.to_string(), SourceConfig::with_rate(3.0, 3));
        sources.insert(CROSSREF.to_string(), SourceConfig::with_rate(5.0, 4));
        sources.insert(OPENALEX.to_string(), SourceConfig::with_rate(10.0, 5));
        // arXiv asks for one request every three seconds
        sources.insert(
            ARXIV.to_string(),
            SourceConfig {
                timeout_secs: 20,
                ..SourceConfig::with_rate(0.34, 1)
            },
        );
        sources.insert(EASYSCHOLAR.to_string(), SourceConfig::with_rate(2.0, 2));

        Self {
            cache: CacheConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            search: SearchConfig::default(),
            merge: MergeConfig::default(),
            sources,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, a TOML file and the environment.
    ///
    /// Without an explicit path, `<config dir>/research-aggregator/config.toml`
    /// is read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    builder = builder.add_source(File::from(default_path).required(false));
                }
            }
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("search.default_sources")
                    .with_list_parse_key("merge.source_priority"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered over the defaults (no environment)
    pub fn from_toml(document: &str) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(File::from_str(document, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Service(format!("cannot render config: {e}")))
    }

    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Settings for one source; unknown or disabled sources yield `None`
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.get(name).filter(|s| s.enabled)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 {
            return Err(Error::invalid_input("cache.ttl_secs", "must be greater than 0"));
        }
        if self.orchestrator.request_deadline_secs == 0 {
            return Err(Error::invalid_input(
                "orchestrator.request_deadline_secs",
                "must be greater than 0",
            ));
        }
        if self.orchestrator.default_timeout_secs == 0 {
            return Err(Error::invalid_input(
                "orchestrator.default_timeout_secs",
                "must be greater than 0",
            ));
        }

        for (name, source) in self.sources.iter().filter(|(_, s)| s.enabled) {
            let rate = source.requests_per_second;
            if rate.is_nan() || rate < MIN_REQUESTS_PER_SECOND {
                return Err(Error::invalid_input(
                    format!("sources.{name}.requests_per_second"),
                    format!("must be at least {MIN_REQUESTS_PER_SECOND}"),
                ));
            }
            if source.max_concurrent == 0 {
                return Err(Error::invalid_input(
                    format!("sources.{name}.max_concurrent"),
                    "must be greater than 0",
                ));
            }
            if source.retry.max_attempts == 0 {
                return Err(Error::invalid_input(
                    format!("sources.{name}.retry.max_attempts"),
                    "must be greater than 0",
                ));
            }
            if source.retry.multiplier < 1.0 {
                return Err(Error::invalid_input(
                    format!("sources.{name}.retry.multiplier"),
                    "must be at least 1.0",
                ));
            }
            if !(0.0..=1.0).contains(&source.retry.jitter) {
                return Err(Error::invalid_input(
                    format!("sources.{name}.retry.jitter"),
                    "must be between 0.0 and 1.0",
                ));
            }
            if let Some(base_url) = &source.base_url {
                url::Url::parse(base_url).map_err(|e| {
                    Error::invalid_input(format!("sources.{name}.base_url"), e.to_string())
                })?;
            }
        }

        if self.merge.source_priority.is_empty() {
            return Err(Error::invalid_input(
                "merge.source_priority",
                "must list at least one source",
            ));
        }

        if self.search.default_sources.is_empty() {
            return Err(Error::invalid_input(
                "search.default_sources",
                "must list at least one source",
            ));
        }
        for name in &self.search.default_sources {
            if !BIBLIOGRAPHIC_SOURCES.contains(&name.as_str()) {
                return Err(Error::invalid_input(
                    "search.default_sources",
                    format!("unknown source '{name}'"),
                ));
            }
            if self.source(name).is_none() {
                return Err(Error::invalid_input(
                    "search.default_sources",
                    format!("source '{name}' is disabled"),
                ));
            }
        }

        if self.search.max_results_limit == 0
            || self.search.default_max_results == 0
            || self.search.default_max_results > self.search.max_results_limit
        {
            return Err(Error::invalid_input(
                "search.default_max_results",
                format!(
                    "must be between 1 and max_results_limit ({})",
                    self.search.max_results_limit
                ),
            ));
        }

        Ok(())
    }
}
