use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Request-scoped bounds for one engine operation: an absolute deadline
/// covering the whole fan-out plus an external cancellation token.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub request_id: Uuid,
    pub deadline: Instant,
    pub cancel: CancellationToken,
}

impl RequestScope {
    /// Scope expiring `budget` from now
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self::with_cancel(budget, CancellationToken::new())
    }

    /// Scope tied to a caller-owned cancellation token
    #[must_use]
    pub fn with_cancel(budget: Duration, cancel: CancellationToken) -> Self {
        let request_id = Uuid::new_v4();
        debug!("Opened request scope {} ({:?} budget)", request_id, budget);
        Self {
            request_id,
            deadline: Instant::now() + budget,
            cancel,
        }
    }

    /// Time left before the deadline
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Extension trait to bound a future by a duration
pub trait TimeoutExt<T> {
    async fn with_timeout_duration(self, duration: Duration) -> Result<T>;
}

impl<F, T> TimeoutExt<T> for F
where
    F: Future<Output = T>,
{
    async fn with_timeout_duration(self, duration: Duration) -> Result<T> {
        match timeout(duration, self).await {
            Ok(result) => Ok(result),
            Err(_) => Err(Error::Timeout { timeout: duration }),
        }
    }
}
