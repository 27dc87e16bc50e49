//! Server Configuration
//!
//! Optional file (`config/polyhouse.*` or `$POLYHOUSE_CONFIG`) overridden by
//! `POLYHOUSE_<SECTION>__<KEY>` environment variables.

use crate::rate_limit::RateLimitConfig;
use chrono::FixedOffset;
use config::{Config, Environment, File};
use control_engine::Thresholds;
use data_validator::ValidationConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default config file stem, any supported extension
pub const DEFAULT_CONFIG_PATH: &str = "config/polyhouse";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Full application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub control: Thresholds,
    pub validation: ValidationConfig,
    pub display: DisplayConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Allow any origin; the dashboard is served separately
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            cors_permissive: true,
        }
    }
}

/// Which store implementation to open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_url: "sqlite://polyhouse.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Presentation of timestamps
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Offset applied when rendering instants (+05:30)
    pub utc_offset_seconds: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_seconds: 5 * 3600 + 30 * 60,
        }
    }
}

impl DisplayConfig {
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "display.utc_offset_seconds {} is not a valid offset",
                self.utc_offset_seconds
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load from `$POLYHOUSE_CONFIG` (or the default path) plus environment
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("POLYHOUSE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load from a specific file stem; a missing file is not an error
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("POLYHOUSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.display.offset()?;

        if let (Some(min), Some(max)) = (
            self.validation.temperature_min,
            self.validation.temperature_max,
        ) {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "validation.temperature_min {} exceeds temperature_max {}",
                    min, max
                )));
            }
        }

        if self.rate_limit.enabled
            && (self.rate_limit.per_second == 0 || self.rate_limit.burst_size == 0)
        {
            return Err(ConfigError::Invalid(
                "rate_limit.per_second and burst_size must be positive".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Sqlite && self.storage.database_url.is_empty() {
            return Err(ConfigError::Invalid(
                "storage.database_url is required for the sqlite backend".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.control.exhaust_above, 25.0);
        assert_eq!(config.control.sprinkler_above, 28.0);
        assert_eq!(config.display.utc_offset_seconds, 19800);
        assert!(config.validation.temperature_min.is_none());
        assert!(!config.rate_limit.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from("does/not/exist/polyhouse").unwrap();
        assert_eq!(config.display.utc_offset_seconds, 19800);
    }

    #[test]
    fn test_partial_file() {
        let config = parse(
            r#"
            [storage]
            backend = "memory"

            [control]
            sprinkler_above = 30.0

            [validation]
            temperature_min = -55.0
            temperature_max = 125.0
            "#,
        );
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.max_connections, 5);
        assert_eq!(config.control.exhaust_above, 25.0);
        assert_eq!(config.control.sprinkler_above, 30.0);
        assert_eq!(config.validation.temperature_max, Some(125.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = parse(
            r#"
            [control]
            exhaust_above = 29.0
            sprinkler_above = 28.0
            "#,
        );
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_offset_rejected() {
        let mut config = AppConfig::default();
        config.display.utc_offset_seconds = 90_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enabled_rate_limit_needs_quota() {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = true;
        config.rate_limit.burst_size = 0;
        assert!(config.validate().is_err());
    }
}
