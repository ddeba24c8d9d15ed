//! Concurrent fan-out of one operation across several sources.
//!
//! Every source has exactly one [`SourceHandle`]: its adapter plus the shared
//! rate limiter, concurrency permits and retry policy that all calls against
//! that source go through. Quality providers get a [`QualityHandle`] built the
//! same way, sharing the adapter's limiter when the service is both.

use crate::client::providers::{
    AdapterCapabilities, AdapterError, ErrorKind, QualityProvider, SourceAdapter, SourceFailure,
};
use crate::client::RateLimiter;
use crate::merge::quality::QualityMetrics;
use crate::resilience::{retry_with_policy, RequestScope, RetryPolicy};
use crate::{Error, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

/// One registered source and the resources shared by all calls against it
#[derive(Clone)]
pub struct SourceHandle {
    pub name: String,
    pub adapter: Arc<dyn SourceAdapter>,
    pub limiter: Arc<RateLimiter>,
    pub permits: Arc<Semaphore>,
    pub retry: RetryPolicy,
    /// Bound on every single attempt
    pub timeout: Duration,
}

impl SourceHandle {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        requests_per_second: f64,
        max_concurrent: usize,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        let name = adapter.name().to_string();
        Self {
            limiter: Arc::new(RateLimiter::new(name.clone(), requests_per_second)),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            name,
            adapter,
            retry,
            timeout,
        }
    }

    #[must_use]
    pub fn capabilities(&self) -> AdapterCapabilities {
        self.adapter.capabilities()
    }
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle")
            .field("name", &self.name)
            .field("available_permits", &self.permits.available_permits())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A quality provider and the throttling every metrics lookup goes through
#[derive(Clone)]
pub struct QualityHandle {
    pub name: String,
    pub provider: Arc<dyn QualityProvider>,
    pub limiter: Arc<RateLimiter>,
    pub permits: Arc<Semaphore>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl QualityHandle {
    pub fn new(
        provider: Arc<dyn QualityProvider>,
        requests_per_second: f64,
        max_concurrent: usize,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        let name = provider.name().to_string();
        Self {
            limiter: Arc::new(RateLimiter::new(name.clone(), requests_per_second)),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            name,
            provider,
            retry,
            timeout,
        }
    }

    /// Reuse the limiter, permits and policy of the adapter registered for the
    /// same service, so metrics lookups count against its budget
    #[must_use]
    pub fn sharing(provider: Arc<dyn QualityProvider>, source: &SourceHandle) -> Self {
        Self {
            name: provider.name().to_string(),
            provider,
            limiter: Arc::clone(&source.limiter),
            permits: Arc::clone(&source.permits),
            retry: source.retry.clone(),
            timeout: source.timeout,
        }
    }

    /// Metrics for one journal, retried on transient failures. Returns the
    /// outcome and the number of attempts made.
    pub async fn get_metrics(
        &self,
        journal: &str,
    ) -> (std::result::Result<QualityMetrics, AdapterError>, u32) {
        let provider = &self.provider;
        guarded_call(
            &self.name,
            "quality",
            &self.limiter,
            &self.permits,
            &self.retry,
            self.timeout,
            || provider.get_metrics(journal),
        )
        .await
    }
}

impl fmt::Debug for QualityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityHandle")
            .field("name", &self.name)
            .field("available_permits", &self.permits.available_permits())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Per-source execution statistics for one fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceStat {
    pub source: String,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub error: Option<ErrorKind>,
}

/// Outcome of a fan-out: never an error by itself, just who answered
#[derive(Debug, Clone)]
pub struct FanOutResult<T> {
    pub successes: Vec<(String, T)>,
    pub failures: Vec<SourceFailure>,
    pub stats: Vec<SourceStat>,
}

impl<T> Default for FanOutResult<T> {
    fn default() -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
            stats: Vec::new(),
        }
    }
}

impl<T> FanOutResult<T> {
    /// Turn a fan-out where nobody succeeded into an aggregation error
    pub fn into_result(self, operation: &str) -> Result<Self> {
        if self.successes.is_empty() {
            Err(Error::Aggregation {
                operation: operation.to_string(),
                failures: self.failures,
            })
        } else {
            Ok(self)
        }
    }

    #[must_use]
    pub fn succeeded_sources(&self) -> Vec<String> {
        self.successes.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Registry of source handles plus the fan-out executor
#[derive(Debug, Default)]
pub struct Orchestrator {
    sources: BTreeMap<String, SourceHandle>,
}

impl Orchestrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source; a later registration under the same name replaces
    /// the earlier one
    pub fn register(&mut self, handle: SourceHandle) {
        debug!("Registered source {}", handle.name);
        self.sources.insert(handle.name.clone(), handle);
    }

    #[must_use]
    pub fn handle(&self, name: &str) -> Option<&SourceHandle> {
        self.sources.get(name)
    }

    #[must_use]
    pub fn source_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// Look up handles by name, rejecting names nobody registered
    pub fn select(&self, names: &[String]) -> Result<Vec<SourceHandle>> {
        names
            .iter()
            .map(|name| {
                self.sources.get(name).cloned().ok_or_else(|| {
                    Error::invalid_input(
                        "sources",
                        format!(
                            "unknown source '{name}' (available: {})",
                            self.source_names().join(", ")
                        ),
                    )
                })
            })
            .collect()
    }

    /// Every registered handle whose capabilities satisfy `predicate`
    pub fn capable<P>(&self, predicate: P) -> Vec<SourceHandle>
    where
        P: Fn(&AdapterCapabilities) -> bool,
    {
        self.sources
            .values()
            .filter(|handle| predicate(&handle.capabilities()))
            .cloned()
            .collect()
    }

    /// Run `op` against every handle concurrently.
    ///
    /// Each attempt takes the source's concurrency permit, waits on its rate
    /// limiter and is bounded by its per-attempt timeout; transient failures
    /// are retried per the source's policy. When the scope's deadline passes
    /// or its token is cancelled, calls still in flight are dropped and
    /// reported as `Timeout` or `Cancelled`.
    pub async fn fan_out<T, F, Fut>(
        &self,
        handles: &[SourceHandle],
        scope: &RequestScope,
        operation: &str,
        op: F,
    ) -> FanOutResult<T>
    where
        F: Fn(Arc<dyn SourceAdapter>) -> Fut,
        Fut: Future<Output = std::result::Result<T, AdapterError>>,
    {
        let started = Instant::now();
        let op = &op;
        let mut pending: FuturesUnordered<_> = handles
            .iter()
            .map(|handle| async move {
                let begun = Instant::now();
                let (outcome, attempts) = call_source(handle, operation, op).await;
                (handle.name.clone(), outcome, attempts, begun.elapsed())
            })
            .collect();

        let mut outstanding: Vec<String> = handles.iter().map(|h| h.name.clone()).collect();
        let mut result = FanOutResult::default();

        let interrupted = loop {
            tokio::select! {
                biased;
                () = scope.cancel.cancelled() => break Some(ErrorKind::Cancelled),
                () = sleep_until(scope.deadline) => break Some(ErrorKind::Timeout),
                next = pending.next() => match next {
                    Some((name, outcome, attempts, elapsed)) => {
                        outstanding.retain(|n| n != &name);
                        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                        match outcome {
                            Ok(value) => {
                                debug!("{} {} succeeded in {}ms", name, operation, elapsed_ms);
                                result.stats.push(SourceStat {
                                    source: name.clone(),
                                    attempts,
                                    elapsed_ms,
                                    error: None,
                                });
                                result.successes.push((name, value));
                            }
                            Err(error) => {
                                warn!("{} {} failed after {} attempt(s): {}", name, operation, attempts, error);
                                result.stats.push(SourceStat {
                                    source: name.clone(),
                                    attempts,
                                    elapsed_ms,
                                    error: Some(error.kind()),
                                });
                                result.failures.push(SourceFailure::from_error(name, &error));
                            }
                        }
                    }
                    None => break None,
                }
            }
        };
        drop(pending);

        if let Some(kind) = interrupted {
            let message = match kind {
                ErrorKind::Cancelled => "request cancelled",
                _ => "request deadline exceeded",
            };
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            for name in outstanding {
                warn!("{} {} abandoned: {}", name, operation, message);
                result.stats.push(SourceStat {
                    source: name.clone(),
                    attempts: 0,
                    elapsed_ms,
                    error: Some(kind),
                });
                result.failures.push(SourceFailure {
                    source: name,
                    kind,
                    message: message.to_string(),
                });
            }
        }

        info!(
            "Fan-out {} [{}]: {} succeeded, {} failed in {}ms",
            operation,
            scope.request_id,
            result.successes.len(),
            result.failures.len(),
            started.elapsed().as_millis()
        );

        result
    }
}

/// One source's share of a fan-out
async fn call_source<T, F, Fut>(
    handle: &SourceHandle,
    operation: &str,
    op: &F,
) -> (std::result::Result<T, AdapterError>, u32)
where
    F: Fn(Arc<dyn SourceAdapter>) -> Fut,
    Fut: Future<Output = std::result::Result<T, AdapterError>>,
{
    guarded_call(
        &handle.name,
        operation,
        &handle.limiter,
        &handle.permits,
        &handle.retry,
        handle.timeout,
        || op(Arc::clone(&handle.adapter)),
    )
    .await
}

/// Retry loop around permit, limiter and per-attempt timeout. Returns the
/// outcome and the number of attempts made.
async fn guarded_call<T, F, Fut>(
    name: &str,
    operation: &str,
    limiter: &RateLimiter,
    permits: &Semaphore,
    retry: &RetryPolicy,
    attempt_timeout: Duration,
    op: F,
) -> (std::result::Result<T, AdapterError>, u32)
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, AdapterError>>,
{
    let mut attempts = 0;
    let label = format!("{name}:{operation}");

    let outcome = retry_with_policy(
        |attempt| {
            attempts = attempt;
            let call = op();
            async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|_| AdapterError::Network("concurrency limiter closed".to_string()))?;
                limiter.acquire().await;

                let outcome = timeout(attempt_timeout, call)
                    .await
                    .unwrap_or(Err(AdapterError::Timeout));

                if let Err(AdapterError::RateLimited {
                    retry_after: Some(delay),
                }) = &outcome
                {
                    limiter.penalize(*delay).await;
                }
                outcome
            }
        },
        retry,
        &label,
    )
    .await;

    (outcome, attempts)
}
