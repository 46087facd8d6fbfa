//! Decision and outcome records.
//!
//! A [`Decision`] is what callers hand to the logger. On ingestion it becomes a
//! [`DecisionRecord`] carrying a derived identifier, an ingestion timestamp and
//! a lifecycle [`DecisionStatus`]. Outcomes that arrive later are stored as
//! [`OutcomeRecord`]s on the record they refer to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

use crate::error::LoggerError;

/// Length of a decision identifier in hex characters.
pub const DECISION_ID_LEN: usize = 16;

/// Lifecycle of a decision record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    /// Created but not yet queued.
    Pending,
    /// Waiting in the batch queue, or awaiting a retry.
    Queued,
    /// Acknowledged by the sink that decides success.
    Submitted,
    /// Retries exhausted or permanently rejected.
    Failed,
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Submitted => "SUBMITTED",
            Self::Failed => "FAILED",
        })
    }
}

/// A decision as submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Category tag, e.g. `STRATEGY_CHANGE` or `RISK_ASSESSMENT`.
    #[serde(rename = "type", alias = "decision_type", default)]
    pub decision_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Certainty in `[0, 1]`; absent means 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default)]
    pub reasoning: String,

    /// Free-form context attached by the caller.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl Decision {
    pub fn new(decision_type: impl Into<String>) -> Self {
        Self {
            decision_type: decision_type.into(),
            ..Default::default()
        }
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Parse a decision from loosely-typed JSON.
    ///
    /// `null` and non-object values are rejected, as is anything
    /// [`Decision::validate`] refuses.
    pub fn from_value(value: serde_json::Value) -> Result<Self, LoggerError> {
        match value {
            serde_json::Value::Null => Err(LoggerError::InvalidDecision(
                "decision is null".to_string(),
            )),
            serde_json::Value::Object(_) => {
                let decision: Decision = serde_json::from_value(value)
                    .map_err(|e| LoggerError::InvalidDecision(e.to_string()))?;
                decision.validate()?;
                Ok(decision)
            }
            other => Err(LoggerError::InvalidDecision(format!(
                "decision must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), LoggerError> {
        if self.decision_type.trim().is_empty() {
            return Err(LoggerError::InvalidDecision(
                "decision is missing a type".to_string(),
            ));
        }
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(LoggerError::InvalidDecision(format!(
                    "confidence {confidence} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Acknowledgement returned by the remote consensus log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAck {
    /// Opaque reference assigned by the log (e.g. a running hash).
    pub reference: String,
    /// Position of the message in the log.
    pub sequence: u64,
}

/// Result data attached to a decision after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub decision_id: String,
    pub result: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(decision_id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            decision_id: decision_id.into(),
            result,
            recorded_at: Utc::now(),
        }
    }
}

/// One logged decision and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,

    #[serde(rename = "type")]
    pub decision_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    pub confidence: f64,

    pub reasoning: String,

    /// Set when `reasoning` was cut to the configured limit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reasoning_truncated: bool,

    /// Byte length of the reasoning before truncation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_original_bytes: Option<usize>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,

    /// Ingestion time, strictly increasing in queue order.
    pub created_at: DateTime<Utc>,

    /// Ingestion counter within this logger instance.
    pub sequence: u64,

    pub status: DecisionStatus,

    /// Remote acknowledgement, present once the remote log accepted the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ref: Option<RemoteAck>,

    /// Whether the local sink holds a copy of the record.
    #[serde(default)]
    pub local_logged: bool,

    /// Remote submission attempts made so far.
    #[serde(default)]
    pub attempts: u32,

    /// Last failure reason, kept once the record is `FAILED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeRecord>,
}

impl DecisionRecord {
    /// Build a `PENDING` record from a caller's decision.
    pub fn create(
        decision: Decision,
        clock: &RecordClock,
        max_reasoning_bytes: Option<usize>,
    ) -> Result<Self, LoggerError> {
        decision.validate()?;

        let stamp = clock.next_stamp();
        let id = derive_id(&decision.decision_type, stamp.at, stamp.counter, clock.salt);

        let (reasoning, original_bytes) = match max_reasoning_bytes {
            Some(limit) if decision.reasoning.len() > limit => {
                let original = decision.reasoning.len();
                (truncate_utf8(decision.reasoning, limit), Some(original))
            }
            _ => (decision.reasoning, None),
        };

        Ok(Self {
            id,
            decision_type: decision.decision_type,
            strategy: decision.strategy,
            action: decision.action,
            confidence: decision.confidence.unwrap_or(0.0),
            reasoning,
            reasoning_truncated: original_bytes.is_some(),
            reasoning_original_bytes: original_bytes,
            metadata: decision.metadata,
            created_at: stamp.at,
            sequence: stamp.counter,
            status: DecisionStatus::Pending,
            remote_ref: None,
            local_logged: false,
            attempts: 0,
            failure: None,
            outcome: None,
        })
    }

    /// Serialized form submitted to the remote log.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Entry written to the local log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    Decision(DecisionRecord),
    Outcome(OutcomeRecord),
}

impl LedgerEntry {
    /// Serialize as a single JSON Lines line, including the trailing newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

struct Stamp {
    at: DateTime<Utc>,
    counter: u64,
}

/// Issues ingestion timestamps and identifier inputs for one logger.
///
/// Timestamps never repeat or go backwards, even if the wall clock does.
pub struct RecordClock {
    salt: u64,
    state: Mutex<ClockState>,
}

struct ClockState {
    last: Option<DateTime<Utc>>,
    counter: u64,
}

impl RecordClock {
    pub fn new() -> Self {
        Self {
            salt: rand::random(),
            state: Mutex::new(ClockState {
                last: None,
                counter: 0,
            }),
        }
    }

    fn next_stamp(&self) -> Stamp {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut at = Utc::now();
        if let Some(last) = state.last {
            if at <= last {
                at = last + chrono::Duration::microseconds(1);
            }
        }
        state.last = Some(at);
        state.counter += 1;
        Stamp {
            at,
            counter: state.counter,
        }
    }
}

impl Default for RecordClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash `(type, timestamp, counter, salt)` down to a fixed-length hex id.
fn derive_id(decision_type: &str, at: DateTime<Utc>, counter: u64, salt: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(decision_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(at.timestamp().to_be_bytes());
    hasher.update(at.timestamp_subsec_nanos().to_be_bytes());
    hasher.update(counter.to_be_bytes());
    hasher.update(salt.to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..DECISION_ID_LEN / 2])
}

fn truncate_utf8(mut text: String, limit: usize) -> String {
    let mut end = limit.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}
