//! Per-action rate limiting over an external TTL'd counter.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ServiceError;
use crate::store::RateCounterStore;

/// Budget for one action: `limit` attempts per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub limit: u64,
    pub window: Duration,
}

impl RatePolicy {
    pub fn new(limit: u64, window_secs: u64) -> Self {
        Self {
            limit,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Sliding-window counter keyed by `(action, identifier)`. The counter
/// increments on every attempt regardless of outcome; once the count exceeds
/// the budget, attempts are rejected until the window rolls.
#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<dyn RateCounterStore>,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn RateCounterStore>) -> Self {
        Self { counters }
    }

    /// Count this attempt and reject it when the budget is exhausted.
    pub async fn check(
        &self,
        action: &str,
        identifier: &str,
        policy: RatePolicy,
    ) -> Result<(), ServiceError> {
        let key = format!("rate:{}:{}", action, identifier);
        let count = self.counters.increment(&key, policy.window).await?;

        if count > policy.limit {
            tracing::warn!(
                action = action,
                identifier = identifier,
                count = count,
                limit = policy.limit,
                "Rate limit exceeded"
            );
            return Err(ServiceError::RateLimitExceeded {
                retry_after_secs: policy.window.as_secs(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCounterStore;

    #[tokio::test]
    async fn allows_up_to_the_limit() {
        let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()));
        let policy = RatePolicy::new(3, 60);

        for _ in 0..3 {
            assert!(limiter.check("login", "10.0.0.1", policy).await.is_ok());
        }
        assert!(matches!(
            limiter.check("login", "10.0.0.1", policy).await,
            Err(ServiceError::RateLimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()));
        let policy = RatePolicy::new(1, 60);

        assert!(limiter.check("login", "10.0.0.1", policy).await.is_ok());
        assert!(limiter.check("login", "10.0.0.2", policy).await.is_ok());
        assert!(limiter
            .check("password_reset", "10.0.0.1", policy)
            .await
            .is_ok());
    }
}
