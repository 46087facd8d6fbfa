//! Remote consensus log configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Settings for the ordered remote log decisions are submitted to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsensusConfig {
    /// Topic (stream) name the decisions are appended to.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Largest payload, in bytes, the log accepts for a single message.
    /// Longer payloads are split into chunks of this size.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Most chunks one payload may be split into.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            max_message_bytes: default_max_message_bytes(),
            max_chunks: default_max_chunks(),
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::Config(
                "consensus.topic must not be empty".to_string(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Config(
                "consensus.max_message_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_chunks == 0 {
            return Err(ConfigError::Config(
                "consensus.max_chunks must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Largest payload the log accepts once chunked.
    pub fn max_payload_bytes(&self) -> usize {
        self.max_message_bytes.saturating_mul(self.max_chunks)
    }
}

fn default_topic() -> String {
    "decisions".to_string()
}

fn default_max_message_bytes() -> usize {
    6144
}

fn default_max_chunks() -> usize {
    20
}
