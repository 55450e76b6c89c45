//! Configuration management module for the reconciliation engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
//!
//! The built-in API table ([`BuiltinApis`]) lives here as well: it is
//! immutable data constructed once during startup and handed to the
//! components that need it, instead of a package-level registry.
mod builtin;
mod controller;
mod monitoring;
mod queue;
mod watch;
pub use builtin::*;
pub use controller::*;
pub use monitoring::*;
pub use queue::*;
pub use watch::*;

#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix for overrides, e.g. `CONTROLLER__QUEUE__QPS=20`.
pub const ENV_PREFIX: &str = "CONTROLLER";

/// Main configuration container for the controller components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct ControllerConfig {
    /// Worker pool and controller identity
    #[serde(default)]
    pub controller: ControllerSettings,
    /// Work queue rate limiting
    #[serde(default)]
    pub queue: RateLimiterConfig,
    /// List/Watch and dynamic watch registry behavior
    #[serde(default)]
    pub watch: WatchConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Built-in API table; fixed at startup, never read from files or env
    #[serde(skip)]
    pub builtin: BuiltinApis,
}

impl Debug for ControllerConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("controller", &self.controller)
            .field("queue", &self.queue)
            .field("watch", &self.watch)
            .finish_non_exhaustive()
    }
}

impl ControllerConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `CONTROLLER__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred to allow further overrides via `with_override_config()`.
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONTROLLER__CONTROLLER__WORKERS", "8");
    /// let cfg = ControllerConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns the first validation error from any subsystem.
    pub fn validate(self) -> Result<Self> {
        self.controller.validate()?;
        self.queue.validate()?;
        self.watch.validate()?;
        self.monitoring.validate()?;
        self.builtin.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

pub(crate) fn invalid(msg: impl Into<String>) -> crate::Error {
    crate::Error::Config(config::ConfigError::Message(msg.into()))
}
