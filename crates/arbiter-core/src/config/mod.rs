//! Configuration types for the Arbiter decision logger.
//!
//! Configuration is loaded from a single YAML file (`arbiter.yaml`). Every
//! field has a default, so an empty file yields a working setup:
//!
//! ```yaml
//! project: momentum-bot
//! logger:
//!   batch_size: 25
//!   batch_timeout_ms: 2000
//!   local_log_path: ./logs/decisions
//!   retention:
//!     max_entries: 50000
//! consensus:
//!   topic: strategy-decisions
//! ```

pub mod consensus;
pub mod logger;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use consensus::ConsensusConfig;
pub use logger::{LoggerConfig, RetentionConfig};

/// Complete Arbiter configuration loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArbiterConfig {
    /// Project name.
    #[serde(default)]
    pub project: Option<String>,

    /// Decision logger settings.
    #[serde(default)]
    pub logger: LoggerConfig,

    /// Remote consensus log settings.
    #[serde(default)]
    pub consensus: ConsensusConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ArbiterConfig {
    /// Load configuration from a YAML file.
    ///
    /// A relative `logger.local_log_path` is resolved against the directory
    /// containing the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        if config.logger.local_log_path.is_relative() {
            config.logger.local_log_path = base_dir.join(&config.logger.local_log_path);
        }

        Ok(config)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logger.validate()?;
        self.consensus.validate()
    }
}
