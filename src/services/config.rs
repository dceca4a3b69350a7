//! Configuration management for the armada coordination core.
//!
//! Layered loading: programmatic defaults, then project YAML
//! (`.armada/config.yaml` + `.armada/local.yaml`), then `ARMADA_*`
//! environment variables.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
    #[error("Validation failed for {field}: {reason}")]
    ValidationError { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spawn: SpawnLimitsConfig,
    pub registry: RegistryConfig,
    pub scheduler: SchedulerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spawn: SpawnLimitsConfig::default(),
            registry: RegistryConfig::default(),
            scheduler: SchedulerConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Admission-control bounds for the spawn controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnLimitsConfig {
    /// New requests queue once this many workers are active.
    pub soft_limit: usize,
    /// New requests are rejected outright at this count.
    pub hard_limit: usize,
    /// Requests deeper than this are auto-rejected.
    pub max_depth: u32,
}

impl Default for SpawnLimitsConfig {
    fn default() -> Self {
        Self { soft_limit: 50, hard_limit: 100, max_depth: 3 }
    }
}

/// Worker registry tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seconds a worker may stay unhealthy before it is restart-eligible.
    pub restart_threshold_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { restart_threshold_secs: 300 }
    }
}

/// Scheduler tick tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    /// Ready steps dispatched per execution per tick.
    pub max_ready_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval_ms: 1000, max_ready_per_tick: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: ".armada/armada.db".to_string(), max_connections: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// pretty | json
    pub format: String,
    /// When set, logs also go to this file via a non-blocking appender.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), file: None }
    }
}

impl Config {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest): defaults, `.armada/config.yaml`,
    /// `.armada/local.yaml`, `ARMADA_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".armada/config.yaml"))
            .merge(Yaml::file(".armada/local.yaml"))
            .merge(Env::prefixed("ARMADA_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spawn.hard_limit < self.spawn.soft_limit {
            return Err(ConfigError::ValidationError {
                field: "spawn.hard_limit".into(),
                reason: format!(
                    "hard_limit ({}) must be >= soft_limit ({})",
                    self.spawn.hard_limit, self.spawn.soft_limit
                ),
            });
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationError {
                field: "scheduler.tick_interval_ms".into(),
                reason: "must be positive".into(),
            });
        }
        if self.scheduler.max_ready_per_tick == 0 {
            return Err(ConfigError::ValidationError {
                field: "scheduler.max_ready_per_tick".into(),
                reason: "must be positive".into(),
            });
        }
        if !matches!(self.logging.level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
            return Err(ConfigError::ValidationError {
                field: "logging.level".into(),
                reason: format!("unknown level: {}", self.logging.level),
            });
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError {
                field: "logging.format".into(),
                reason: format!("unknown format: {}", self.logging.format),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_documented_limits() {
        let config = Config::default();
        assert_eq!(config.spawn.soft_limit, 50);
        assert_eq!(config.spawn.hard_limit, 100);
        assert_eq!(config.spawn.max_depth, 3);
        assert_eq!(config.scheduler.tick_interval_ms, 1000);
        assert_eq!(config.scheduler.max_ready_per_tick, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_limits() {
        let mut config = Config::default();
        config.spawn.hard_limit = 10;
        config.spawn.soft_limit = 20;
        assert!(config.validate().is_err());
    }
}
