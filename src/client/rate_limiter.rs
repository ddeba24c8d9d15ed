use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Slowest rate a limiter honours; anything lower is treated as this
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Interval rate limiter shared by every caller of one source.
///
/// Callers reserve the next free slot under the lock and then sleep outside
/// it, so concurrent acquirers are spaced `min_interval` apart without holding
/// the mutex across the wait.
#[derive(Debug)]
pub struct RateLimiter {
    source: String,
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` requests per second.
    /// Zero, negative and NaN rates fall back to one per second; positive
    /// rates below [`MIN_REQUESTS_PER_SECOND`] are raised to it.
    pub fn new(source: impl Into<String>, requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            let rate = requests_per_second.max(MIN_REQUESTS_PER_SECOND);
            Duration::try_from_secs_f64(rate.recip())
                .unwrap_or_else(|_| Duration::from_secs_f64(MIN_REQUESTS_PER_SECOND.recip()))
        } else {
            Duration::from_secs(1)
        };
        let source = source.into();

        debug!(
            "Created rate limiter for {}: {} requests per second",
            source, requests_per_second
        );

        Self {
            source,
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait until this caller's reserved slot comes up
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.min_interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            debug!(
                "Rate limiter {}: waiting {}ms",
                self.source,
                (slot - now).as_millis()
            );
            sleep_until(slot).await;
        }
    }

    /// Push the next free slot out by `delay`, e.g. after a provider
    /// answered with a retry-after hint
    pub async fn penalize(&self, delay: Duration) {
        let mut next = self.next_slot.lock().await;
        let earliest = Instant::now() + delay;
        if next.map_or(true, |n| n < earliest) {
            debug!(
                "Rate limiter {}: backing off {}ms",
                self.source,
                delay.as_millis()
            );
            *next = Some(earliest);
        }
    }

    /// Time until a request would be allowed without waiting
    pub async fn time_until_ready(&self) -> Option<Duration> {
        let next = *self.next_slot.lock().await;
        let now = Instant::now();
        next.filter(|n| *n > now).map(|n| n - now)
    }

    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}
