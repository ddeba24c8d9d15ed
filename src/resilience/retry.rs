use crate::client::providers::AdapterError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy applied uniformly to every call made against one source
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Maximum jitter as a fraction of the delay
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether a failed attempt number `attempt` (1-based) should be retried
    #[must_use]
    pub const fn should_retry(&self, attempt: u32, error: &AdapterError) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    ///
    /// A provider-supplied retry-after wins over the computed backoff, capped
    /// at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &AdapterError) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return retry_after.min(self.max_delay);
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_ms = self.initial_delay.as_millis() as f64;
        let backoff_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = backoff_ms.min(self.max_delay.as_millis() as f64);

        add_jitter(Duration::from_millis(capped_ms as u64), self.jitter).min(self.max_delay)
    }
}

/// Execute an adapter call, retrying transient failures per `policy`
pub async fn retry_with_policy<T, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    operation_name: &str,
) -> Result<T, AdapterError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let mut attempt = 1;

    loop {
        debug!(
            "Executing operation '{}' (attempt {})",
            operation_name, attempt
        );

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded after {} attempts",
                        operation_name, attempt
                    );
                }
                return Ok(value);
            }
            Err(error) if policy.should_retry(attempt, &error) => {
                let delay = policy.delay_for(attempt, &error);
                debug!(
                    "Operation '{}' failed (attempt {}), retrying after {:?}: {}",
                    operation_name, attempt, delay, error
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if error.is_transient() {
                    warn!(
                        "Operation '{}' failed after {} attempts: {}",
                        operation_name, attempt, error
                    );
                } else {
                    debug!(
                        "Operation '{}' failed with non-retryable error: {}",
                        operation_name, error
                    );
                }
                return Err(error);
            }
        }
    }
}

fn add_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return delay;
    }

    use rand::Rng;
    let jitter_ms = (delay.as_millis() as f64 * jitter_factor) as u64;
    let jitter = rand::thread_rng().gen_range(0..=jitter_ms);

    delay + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_policy(
            move |_| {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(AdapterError::Server {
                            status: 503,
                            message: "temporary failure".to_string(),
                        })
                    } else {
                        Ok(42u32)
                    }
                }
            },
            &fast_policy(3),
            "test_operation",
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_policy(
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err::<u32, _>(AdapterError::Malformed("bad json".to_string())) }
            },
            &fast_policy(5),
            "test_operation",
        )
        .await;

        assert!(matches!(result, Err(AdapterError::Malformed(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_policy(
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err::<u32, _>(AdapterError::Timeout) }
            },
            &fast_policy(2),
            "test_operation",
        )
        .await;

        assert_eq!(result, Err(AdapterError::Timeout));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delay_honours_retry_after() {
        let policy = RetryPolicy::default();
        let error = AdapterError::RateLimited {
            retry_after: Some(Duration::from_secs(4)),
        };
        assert_eq!(policy.delay_for(1, &error), Duration::from_secs(4));

        let long = AdapterError::RateLimited {
            retry_after: Some(Duration::from_secs(600)),
        };
        assert_eq!(policy.delay_for(1, &long), policy.max_delay);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1, &AdapterError::Timeout), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2, &AdapterError::Timeout), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3, &AdapterError::Timeout), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(20, &AdapterError::Timeout), policy.max_delay);
    }

    #[test]
    fn test_jitter_calculation() {
        let delay = Duration::from_millis(1000);
        let jittered = add_jitter(delay, 0.1);

        assert!(jittered >= delay);
        assert!(jittered <= delay + Duration::from_millis(100));
    }
}
