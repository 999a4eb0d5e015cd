//! Request budget shared by every outbound tracker request.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::domain::models::RateLimitConfig;

/// Token bucket over outbound tracker requests.
///
/// One token is spent per HTTP attempt, retries and pages included.
/// Callers wait for a token; an empty bucket never fails a request.
pub struct RequestBudget {
    limiter: DefaultDirectRateLimiter,
}

impl RequestBudget {
    /// Budget refilling `requests_per_second` tokens up to `burst_size`.
    ///
    /// Non-positive rates and a zero burst fall back to one request per
    /// second with a burst of one; the config loader rejects both earlier.
    pub fn new(requests_per_second: f64, burst_size: u32) -> Self {
        let period = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::from_secs(1)
        };
        let burst = NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Budget described by the `[rate_limit]` section.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }

    /// Wait until a request may be sent.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a token without waiting; `false` when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_burst_then_empty() {
        let budget = RequestBudget::new(0.5, 2);
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
    }

    #[test]
    fn test_invalid_rate_falls_back() {
        let budget = RequestBudget::new(0.0, 0);
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let budget = RequestBudget::new(20.0, 1);
        let started = Instant::now();
        budget.acquire().await;
        budget.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
