use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Identity and worker pool parameters of one controller instance
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControllerSettings {
    /// Name used to tag log records, metrics and the work queue
    #[serde(default = "default_name")]
    pub name: String,

    /// Number of parallel workers draining the work queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Period for replaying every cached primary object as an update.
    /// 0 disables periodic resync.
    #[serde(default)]
    pub resync_period_ms: u64,

    /// Upper bound for waiting on the first primary List before workers start
    #[serde(default = "default_cache_sync_timeout_ms")]
    pub cache_sync_timeout_ms: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            workers: default_workers(),
            resync_period_ms: 0,
            cache_sync_timeout_ms: default_cache_sync_timeout_ms(),
        }
    }
}

impl ControllerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("controller.name cannot be empty"));
        }
        if self.workers == 0 {
            return Err(invalid("controller.workers must be at least 1"));
        }
        if self.cache_sync_timeout_ms == 0 {
            return Err(invalid("controller.cache_sync_timeout_ms must be greater than 0"));
        }
        Ok(())
    }

    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_period_ms > 0).then(|| Duration::from_millis(self.resync_period_ms))
    }

    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_sync_timeout_ms)
    }
}

fn default_name() -> String {
    "kcp-workspace-mounts".to_string()
}
fn default_workers() -> usize {
    2
}
fn default_cache_sync_timeout_ms() -> u64 {
    30_000
}
