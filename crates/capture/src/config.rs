//! Tool configuration
//!
//! Optional TOML file supplying defaults for the capture parameters; CLI
//! flags take precedence over anything loaded here.

use anyhow::{Context, Result, anyhow};
use common::types::{DEFAULT_CHUNK_SIZE, DEFAULT_QUEUE_DEPTH};
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Bytes requested per bulk read.
    #[serde(default = "CaptureSettings::default_read_size")]
    pub read_size: NonZeroUsize,
    /// Number of read requests kept in flight.
    #[serde(default = "CaptureSettings::default_queue_size")]
    pub queue_size: NonZeroUsize,
    /// Log level used when neither RUST_LOG nor --log-level is given.
    #[serde(default = "CaptureSettings::default_log_level")]
    pub log_level: String,
}

impl CaptureSettings {
    fn default_read_size() -> NonZeroUsize {
        DEFAULT_CHUNK_SIZE
    }

    fn default_queue_size() -> NonZeroUsize {
        DEFAULT_QUEUE_DEPTH
    }

    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            read_size: Self::default_read_size(),
            queue_size: Self::default_queue_size(),
            log_level: Self::default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the specified path, or from the default
    /// location when none is given.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => {
                let default = Self::default_path();
                if !default.exists() {
                    return Err(anyhow!("No configuration file found"));
                }
                default
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or fall back to defaults.
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("fpv-capture").join("config.toml")
        } else {
            PathBuf::from(".config/fpv-capture/config.toml")
        }
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.capture.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.capture.log_level,
                valid_levels.join(", ")
            ));
        }

        Ok(())
    }
}
