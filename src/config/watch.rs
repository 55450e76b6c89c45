use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// List/Watch behavior shared by the primary informer and every dynamic watch
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// First delay before retrying a failed List or Watch (unit: milliseconds)
    #[serde(default = "default_relist_base_delay_ms")]
    pub relist_base_delay_ms: u64,

    /// Ceiling for the relist backoff (unit: milliseconds)
    #[serde(default = "default_relist_max_delay_ms")]
    pub relist_max_delay_ms: u64,

    /// Whether discovered built-in kinds get a dynamic watch as well
    #[serde(default = "default_watch_builtin_kinds")]
    pub watch_builtin_kinds: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            relist_base_delay_ms: default_relist_base_delay_ms(),
            relist_max_delay_ms: default_relist_max_delay_ms(),
            watch_builtin_kinds: default_watch_builtin_kinds(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.relist_base_delay_ms == 0 {
            return Err(invalid("watch.relist_base_delay_ms must be at least 1ms"));
        }
        if self.relist_max_delay_ms < self.relist_base_delay_ms {
            return Err(invalid(
                "watch.relist_max_delay_ms must not be lower than watch.relist_base_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn relist_base_delay(&self) -> Duration {
        Duration::from_millis(self.relist_base_delay_ms)
    }

    pub fn relist_max_delay(&self) -> Duration {
        Duration::from_millis(self.relist_max_delay_ms)
    }
}

fn default_relist_base_delay_ms() -> u64 {
    100
}
fn default_relist_max_delay_ms() -> u64 {
    30_000
}
fn default_watch_builtin_kinds() -> bool {
    true
}
