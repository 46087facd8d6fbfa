//! Remote consensus log.
//!
//! The pipeline treats the remote side as an ordered, append-only log that
//! acknowledges every accepted message with a sequence number. Transports
//! implement [`ConsensusSink`]; [`InMemoryConsensusLog`] is an in-process log
//! with the same contract.

use arbiter_core::ConsensusConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

use crate::error::SinkError;
use crate::record::RemoteAck;

/// Trait for ordered remote logs.
#[async_trait]
pub trait ConsensusSink: Send + Sync {
    /// Submit a single message.
    async fn submit(&self, payload: &[u8]) -> Result<RemoteAck, SinkError>;

    /// Submit messages in order.
    ///
    /// `Ok` carries one result per payload, in order (partial acknowledgement).
    /// `Err` means the whole batch failed and nothing was accepted.
    async fn submit_batch(
        &self,
        payloads: &[Vec<u8>],
    ) -> Result<Vec<Result<RemoteAck, SinkError>>, SinkError> {
        let mut results = Vec::with_capacity(payloads.len());
        for payload in payloads {
            results.push(self.submit(payload).await);
        }
        Ok(results)
    }
}

/// A message accepted by the in-process log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMessage {
    pub sequence: u64,
    pub payload: Vec<u8>,
    /// 1-based position of this chunk within its payload.
    pub chunk_number: usize,
    pub chunk_total: usize,
    /// Hex SHA-256 chained over every message up to and including this one.
    pub running_hash: String,
    pub consensus_at: DateTime<Utc>,
}

/// In-process ordered log with per-message acknowledgements.
///
/// Sequence numbers start at 1 and increase by one per accepted message.
/// Payloads longer than `max_message_bytes` are split into consecutive
/// chunks; payloads needing more than `max_chunks` are rejected permanently.
/// The acknowledgement of a chunked payload is that of its last chunk.
pub struct InMemoryConsensusLog {
    topic: String,
    max_message_bytes: usize,
    max_chunks: usize,
    state: Mutex<LogState>,
}

#[derive(Default)]
struct LogState {
    messages: Vec<ConsensusMessage>,
    running_hash: [u8; 32],
}

impl InMemoryConsensusLog {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            topic: config.topic.clone(),
            max_message_bytes: config.max_message_bytes.max(1),
            max_chunks: config.max_chunks.max(1),
            state: Mutex::new(LogState::default()),
        }
    }

    /// Copy of every accepted message, in sequence order.
    pub fn messages(&self) -> Vec<ConsensusMessage> {
        self.lock().messages.clone()
    }

    /// Accepted payloads with their chunks joined back together.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        let state = self.lock();
        let mut payloads = Vec::new();
        let mut current = Vec::new();
        for message in &state.messages {
            current.extend_from_slice(&message.payload);
            if message.chunk_number == message.chunk_total {
                payloads.push(std::mem::take(&mut current));
            }
        }
        payloads
    }

    /// Number of accepted messages (chunks).
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn append(&self, state: &mut LogState, payload: &[u8]) -> Result<RemoteAck, SinkError> {
        let chunk_total = payload.len().div_ceil(self.max_message_bytes).max(1);
        if chunk_total > self.max_chunks {
            return Err(SinkError::Permanent(format!(
                "message of {} bytes exceeds the {} byte limit of topic {}",
                payload.len(),
                self.max_message_bytes * self.max_chunks,
                self.topic
            )));
        }

        let mut ack = None;
        let chunks = payload.chunks(self.max_message_bytes);
        let chunks: Vec<&[u8]> = if payload.is_empty() { vec![payload] } else { chunks.collect() };
        for (index, chunk) in chunks.into_iter().enumerate() {
            let sequence = state.messages.len() as u64 + 1;
            let mut hasher = Sha256::new();
            hasher.update(state.running_hash);
            hasher.update(self.topic.as_bytes());
            hasher.update(sequence.to_be_bytes());
            hasher.update(chunk);
            state.running_hash = hasher.finalize().into();

            let running_hash = hex::encode(state.running_hash);
            state.messages.push(ConsensusMessage {
                sequence,
                payload: chunk.to_vec(),
                chunk_number: index + 1,
                chunk_total,
                running_hash: running_hash.clone(),
                consensus_at: Utc::now(),
            });
            ack = Some(RemoteAck {
                reference: running_hash,
                sequence,
            });
        }

        ack.ok_or_else(|| SinkError::Permanent("empty message".to_string()))
    }
}

#[async_trait]
impl ConsensusSink for InMemoryConsensusLog {
    async fn submit(&self, payload: &[u8]) -> Result<RemoteAck, SinkError> {
        let mut state = self.lock();
        self.append(&mut state, payload)
    }

    async fn submit_batch(
        &self,
        payloads: &[Vec<u8>],
    ) -> Result<Vec<Result<RemoteAck, SinkError>>, SinkError> {
        let mut state = self.lock();
        Ok(payloads
            .iter()
            .map(|payload| self.append(&mut state, payload))
            .collect())
    }
}
