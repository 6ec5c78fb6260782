//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: Handles data layer settings from environment variables and files

use config::{Config as ConfigBuilder, Environment, File};
use sb_core::{Error, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub storage: StorageConfig,
    #[validate(nested)]
    pub events: EventsConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory holding one collection file per entity kind
    #[validate(length(min = 1))]
    pub data_dir: String,
    /// Site settings file name, resolved inside `data_dir`
    #[validate(length(min = 1))]
    pub settings_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            settings_file: "site-settings.json".to_string(),
        }
    }
}

/// Change-notification bus configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct EventsConfig {
    /// Buffered events per subscriber before the slowest one starts lagging
    #[validate(range(min = 1, max = 65536))]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

impl Config {
    /// Load configuration from environment variables and optional .env file
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // Set defaults first
        builder = builder
            .set_default("storage.data_dir", "./data")?
            .set_default("storage.settings_file", "site-settings.json")?
            .set_default("events.capacity", 64)?;

        // Handle nested environment variables that don't work with the
        // standard separator (two-token field names split wrongly)
        if let Ok(data_dir) = std::env::var("SHIPBOARD_STORAGE_DATA_DIR") {
            builder = builder.set_override("storage.data_dir", data_dir)?;
        }
        if let Ok(settings_file) = std::env::var("SHIPBOARD_STORAGE_SETTINGS_FILE") {
            builder = builder.set_override("storage.settings_file", settings_file)?;
        }

        // Try to load from .env file if it exists (optional)
        if std::path::Path::new(".env").exists() {
            builder = builder.add_source(File::with_name(".env").required(false));
        }

        // Load from environment variables with SHIPBOARD_ prefix (highest priority)
        builder = builder.add_source(
            Environment::with_prefix("SHIPBOARD")
                .try_parsing(true)
                .separator("_"),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        // Validate the configuration
        parsed
            .validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        Ok(parsed)
    }
}
