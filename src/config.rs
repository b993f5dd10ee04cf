//! Configuration management
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-relay.toml)
//! - Environment variables (SCHEMA_RELAY__*)
//!
//! ## Example config file (schema-relay.toml):
//! ```toml
//! [relay]
//! capacity = 100
//! poll_interval_ms = 100
//!
//! [codec]
//! trailing_data = "reject"
//!
//! [registry]
//! schema_dir = "./schemas"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::codec::{Codec, TrailingData};
use crate::relay::DEFAULT_CAPACITY;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Relay buffer and consumer settings
    #[serde(default)]
    pub relay: RelayConfig,

    /// Codec settings
    #[serde(default)]
    pub codec: CodecConfig,

    /// Schema registry settings
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Maximum buffered messages before the oldest is evicted
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// How long an idle consumer waits before polling again
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Codec configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Treatment of bytes left after the last field
    #[serde(default)]
    pub trailing_data: TrailingData,
}

/// Registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory of `.avsc` schema files registered at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_dir: Option<PathBuf>,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl CodecConfig {
    pub fn codec(&self) -> Codec {
        Codec::new(self.trailing_data)
    }
}

impl Settings {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, additionally reading a required file at `config_path`
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schema-relay.toml",
            ".schema-relay.toml",
            "config/schema-relay.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schema-relay") {
            let xdg_config = config_dir.config_dir().join("schema-relay.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMA_RELAY__RELAY__CAPACITY=500
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_RELAY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
