//! Decision logger configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::ConfigError;

/// Configuration for the batched decision logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Number of queued decisions that forces an immediate flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum age (in milliseconds) of the oldest queued decision before a
    /// flush is forced.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Number of resubmissions after the first failed remote attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between remote retries, doubled on every retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on a single retry backoff.
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,

    /// Whether decisions are submitted to the remote consensus log.
    #[serde(default = "default_true")]
    pub enable_remote_logging: bool,

    /// Whether decisions are appended to the local JSON Lines log.
    #[serde(default = "default_true")]
    pub enable_local_logging: bool,

    /// Directory holding local log segments.
    #[serde(default = "default_local_log_path")]
    pub local_log_path: PathBuf,

    /// Size at which a local segment rolls over (0 disables size rollover).
    #[serde(default = "default_max_segment_bytes")]
    pub max_segment_bytes: u64,

    /// Optional cap on the stored reasoning text, in bytes.
    #[serde(default)]
    pub max_reasoning_bytes: Option<usize>,

    /// In-memory history retention.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Retention policy for the in-memory decision history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Maximum retained decisions; the oldest are evicted first. 0 means unbounded.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Optional time-to-live for retained decisions, in seconds.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: None,
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
            enable_remote_logging: true,
            enable_local_logging: true,
            local_log_path: default_local_log_path(),
            max_segment_bytes: default_max_segment_bytes(),
            max_reasoning_bytes: None,
            retention: RetentionConfig::default(),
        }
    }
}

impl LoggerConfig {
    /// Check the settings the pipeline cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Config(
                "logger.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_timeout_ms == 0 {
            return Err(ConfigError::Config(
                "logger.batch_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_retry_backoff_ms < self.retry_backoff_ms {
            return Err(ConfigError::Config(format!(
                "logger.max_retry_backoff_ms ({}) must be >= logger.retry_backoff_ms ({})",
                self.max_retry_backoff_ms, self.retry_backoff_ms
            )));
        }
        if self.enable_local_logging && self.local_log_path.as_os_str().is_empty() {
            return Err(ConfigError::Config(
                "logger.local_log_path must be set when local logging is enabled".to_string(),
            ));
        }
        if self.max_reasoning_bytes == Some(0) {
            return Err(ConfigError::Config(
                "logger.max_reasoning_bytes must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Flush timeout as a `Duration`.
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Backoff to wait before retry number `retry` (1-based).
    pub fn retry_backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self
            .retry_backoff_ms
            .saturating_mul(factor)
            .min(self.max_retry_backoff_ms);
        Duration::from_millis(millis)
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_max_retry_backoff_ms() -> u64 {
    5000
}

fn default_local_log_path() -> PathBuf {
    PathBuf::from("./logs/decisions")
}

fn default_max_segment_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_max_entries() -> usize {
    10_000
}
