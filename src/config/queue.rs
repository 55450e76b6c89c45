use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Rate limiting policy of the work queue.
///
/// The effective delay of `add_rate_limited` is the larger of the per-key
/// exponential backoff and the overall token bucket reservation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct RateLimiterConfig {
    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Sustained overall requeue rate (tokens per second)
    #[serde(default = "default_qps")]
    pub qps: f64,

    /// Token bucket capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            qps: default_qps(),
            burst: default_burst(),
        }
    }
}

impl RateLimiterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(invalid("queue.base_delay_ms must be at least 1ms"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(invalid(format!(
                "queue.max_delay_ms ({}) must not be lower than queue.base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !(self.qps.is_finite() && self.qps > 0.0) {
            return Err(invalid("queue.qps must be a positive number"));
        }
        if self.burst == 0 {
            return Err(invalid("queue.burst must be at least 1"));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

fn default_base_delay_ms() -> u64 {
    5
}
// 1000s
fn default_max_delay_ms() -> u64 {
    1_000_000
}
fn default_qps() -> f64 {
    10.0
}
fn default_burst() -> u32 {
    100
}
