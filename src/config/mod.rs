//! Configuration management
//!
//! Defaults, optionally overlaid by a TOML file and `CALLKEEP__*`
//! environment variables (e.g. `CALLKEEP__REGISTRY__CONNECT_REPORT_DELAY_MS`).

use crate::domain::call_registry::RegistryOptions;
use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub registry: RegistryConfig,
    pub authority: AuthorityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Delay before an accepted outgoing call is reported connected
    pub connect_report_delay_ms: u64,
    pub notification_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Simulated latency of the in-memory authority
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig {
                connect_report_delay_ms: 1000,
                notification_capacity: 64,
            },
            authority: AuthorityConfig { latency_ms: 50 },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder
            .add_source(
                Environment::with_prefix("CALLKEEP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

impl From<&RegistryConfig> for RegistryOptions {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            connect_report_delay: Duration::from_millis(config.connect_report_delay_ms),
            notification_capacity: config.notification_capacity,
        }
    }
}
