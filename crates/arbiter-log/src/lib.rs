//! # arbiter-log
//!
//! Batched decision logging for autonomous strategy engines.
//!
//! Every decision is recorded to two independent sinks:
//! - a remote, ordered, append-only consensus log (acknowledged per message)
//! - a local append-only JSON Lines log, segmented per day
//!
//! Decisions are queued on ingestion and flushed in batches by a background
//! task, either when `batch_size` decisions are waiting or when the oldest has
//! waited `batch_timeout_ms`. Remote failures are retried with exponential
//! backoff; a decision counts as logged once the remote log acknowledges it.
//!
//! ## Decision lifecycle
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `PENDING` | Created, not yet queued |
//! | `QUEUED` | Waiting for a flush or a retry |
//! | `SUBMITTED` | Acknowledged |
//! | `FAILED` | Rejected or out of retries |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use arbiter_core::{ConsensusConfig, LoggerConfig};
//! use arbiter_log::{Decision, DecisionFilter, DecisionLogger};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (logger, _log) = DecisionLogger::in_memory(&ConsensusConfig::default());
//! logger.initialize(LoggerConfig::default()).await?;
//!
//! let id = logger.log_decision(
//!     Decision::new("STRATEGY_CHANGE")
//!         .strategy("momentum")
//!         .confidence(0.85)
//!         .reasoning("volatility regime shifted"),
//! )?;
//!
//! logger.log_decision_outcome(&id, serde_json::json!({"success": true}));
//!
//! let confident = logger.get_decisions(&DecisionFilter::default().min_confidence(0.8));
//! println!("{} confident decisions", confident.len());
//!
//! logger.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod history;
pub mod local;
pub mod logger;
pub mod metrics;
pub mod outcome;
pub mod queue;
pub mod record;
pub mod remote;
mod scheduler;

pub use error::{LoggerError, SinkError};
pub use history::{DecisionFilter, DecisionHistory};
pub use local::{FileSink, LedgerScan, LocalSink, read_entries};
pub use logger::{BatchReceipt, DecisionLogger, Health, LoggerStatus};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use outcome::OutcomeTracker;
pub use queue::BatchQueue;
pub use record::{
    Decision, DecisionRecord, DecisionStatus, LedgerEntry, OutcomeRecord, RecordClock, RemoteAck,
};
pub use remote::{ConsensusMessage, ConsensusSink, InMemoryConsensusLog};
