//! Event service configuration

use std::time::Duration;
use trellis_config::{ConfigError, ConfigManager, Validate};

/// Configuration key: run the whole delivery loop as a tracked task.
pub const DETACHED_DELIVERY_KEY: &str = "events_detached_delivery";
/// Configuration key: log every emit at debug level.
pub const LOG_EMITS_KEY: &str = "events_log_emits";
/// Configuration key: bound on shutdown draining, in milliseconds.
pub const DRAIN_TIMEOUT_KEY: &str = "events_drain_timeout_ms";

/// Event service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventServiceConfig {
    /// Deliver on a spawned task instead of the emitting thread
    pub detached_delivery: bool,

    /// Log every emitted event
    pub log_emits: bool,

    /// Give up draining pending handlers after this long
    pub drain_timeout: Option<Duration>,
}

impl Default for EventServiceConfig {
    fn default() -> Self {
        Self {
            detached_delivery: false,
            log_emits: true,
            drain_timeout: None,
        }
    }
}

impl EventServiceConfig {
    pub fn builder() -> EventServiceConfigBuilder {
        EventServiceConfigBuilder::new()
    }

    /// Read the configuration from a [`ConfigManager`].
    ///
    /// Missing keys keep their defaults; present but malformed keys are errors.
    pub fn from_config(config: &ConfigManager) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let loaded = Self {
            detached_delivery: optional(config, DETACHED_DELIVERY_KEY)?
                .unwrap_or(defaults.detached_delivery),
            log_emits: optional(config, LOG_EMITS_KEY)?.unwrap_or(defaults.log_emits),
            drain_timeout: optional::<u64>(config, DRAIN_TIMEOUT_KEY)?
                .map(Duration::from_millis)
                .or(defaults.drain_timeout),
        };

        loaded.validate()?;
        Ok(loaded)
    }
}

fn optional<T: serde::de::DeserializeOwned>(
    config: &ConfigManager,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match config.get(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::KeyNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

impl Validate for EventServiceConfig {
    fn validate(&self) -> trellis_config::Result<()> {
        if self.drain_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero",
                DRAIN_TIMEOUT_KEY
            )));
        }
        Ok(())
    }
}

/// Event service configuration builder
pub struct EventServiceConfigBuilder {
    config: EventServiceConfig,
}

impl EventServiceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EventServiceConfig::default(),
        }
    }

    /// Enable/disable detached delivery
    pub fn detached_delivery(mut self, enabled: bool) -> Self {
        self.config.detached_delivery = enabled;
        self
    }

    /// Enable/disable emit logging
    pub fn log_emits(mut self, enabled: bool) -> Self {
        self.config.log_emits = enabled;
        self
    }

    /// Bound shutdown draining
    pub fn drain_timeout(mut self, limit: Duration) -> Self {
        self.config.drain_timeout = Some(limit);
        self
    }

    pub fn build(self) -> EventServiceConfig {
        self.config
    }
}

impl Default for EventServiceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
