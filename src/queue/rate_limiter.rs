//! Per-key retry delay policies for [`WorkQueue::add_rate_limited`].
//!
//! [`WorkQueue::add_rate_limited`]: super::WorkQueue::add_rate_limited

use std::time::Duration;

use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::RateLimiterConfig;

#[cfg_attr(test, automock)]
pub trait RateLimiter: Send + Sync + 'static {
    /// Delay before `key` may be retried; records one more failure for it.
    fn when(
        &self,
        key: &str,
    ) -> Duration;

    /// Clears the failure history of `key`.
    fn forget(
        &self,
        key: &str,
    );

    fn num_requeues(
        &self,
        key: &str,
    ) -> u32;
}

/// `base * 2^failures`, capped at `max`
pub struct ExponentialFailureRateLimiter {
    base: Duration,
    max: Duration,
    failures: DashMap<String, u32>,
}

impl ExponentialFailureRateLimiter {
    pub fn new(
        base: Duration,
        max: Duration,
    ) -> Self {
        Self {
            base,
            max,
            failures: DashMap::new(),
        }
    }
}

impl RateLimiter for ExponentialFailureRateLimiter {
    fn when(
        &self,
        key: &str,
    ) -> Duration {
        let exp = {
            let mut entry = self.failures.entry(key.to_string()).or_insert(0);
            let exp = *entry;
            *entry = exp.saturating_add(1);
            exp
        };

        2u32.checked_pow(exp)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    fn forget(
        &self,
        key: &str,
    ) {
        self.failures.remove(key);
    }

    fn num_requeues(
        &self,
        key: &str,
    ) -> u32 {
        self.failures.get(key).map(|n| *n).unwrap_or(0)
    }
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Overall token bucket shared by every key
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    pub fn new(
        qps: f64,
        burst: u32,
    ) -> Self {
        Self {
            qps,
            burst: f64::from(burst),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last: Instant::now(),
            }),
        }
    }
}

impl RateLimiter for BucketRateLimiter {
    fn when(
        &self,
        _key: &str,
    ) -> Duration {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last = now;

        // Reserve a token even when none is available; the debt is the wait.
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.qps)
        }
    }

    fn forget(
        &self,
        _key: &str,
    ) {
    }

    fn num_requeues(
        &self,
        _key: &str,
    ) -> u32 {
        0
    }
}

/// Worst case of several limiters
pub struct MaxOfRateLimiter {
    limiters: Vec<Box<dyn RateLimiter>>,
}

impl MaxOfRateLimiter {
    pub fn new(limiters: Vec<Box<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOfRateLimiter {
    fn when(
        &self,
        key: &str,
    ) -> Duration {
        self.limiters
            .iter()
            .map(|l| l.when(key))
            .max()
            .unwrap_or_default()
    }

    fn forget(
        &self,
        key: &str,
    ) {
        for l in &self.limiters {
            l.forget(key);
        }
    }

    fn num_requeues(
        &self,
        key: &str,
    ) -> u32 {
        self.limiters
            .iter()
            .map(|l| l.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Per-key exponential backoff combined with an overall token bucket.
pub fn default_controller_rate_limiter(config: &RateLimiterConfig) -> MaxOfRateLimiter {
    MaxOfRateLimiter::new(vec![
        Box::new(ExponentialFailureRateLimiter::new(
            config.base_delay(),
            config.max_delay(),
        )),
        Box::new(BucketRateLimiter::new(config.qps, config.burst)),
    ])
}
