//! Decision logger facade.
//!
//! Provides the main `DecisionLogger` type: lifecycle (`initialize` /
//! `shutdown`), ingestion, outcome attachment, lookups and health.

use arbiter_core::{ConsensusConfig, LoggerConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::error::LoggerError;
use crate::history::{DecisionFilter, DecisionHistory};
use crate::local::{FileSink, LocalSink};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::outcome::OutcomeTracker;
use crate::queue::BatchQueue;
use crate::record::{Decision, DecisionRecord, DecisionStatus, RecordClock};
use crate::remote::{ConsensusSink, InMemoryConsensusLog};
use crate::scheduler::{FlushScheduler, Flusher};

/// Error rate above which the logger reports itself degraded.
const DEGRADED_ERROR_RATE: f64 = 0.1;

/// Queue backlog, in batches, above which the logger reports itself degraded.
const DEGRADED_BACKLOG_BATCHES: usize = 10;

/// The batched, dual-sink decision logger.
///
/// Construct it with the remote sink, then call [`DecisionLogger::initialize`]
/// from within a tokio runtime. Ingestion methods are synchronous and never
/// wait on sink I/O.
pub struct DecisionLogger {
    remote: Arc<dyn ConsensusSink>,
    local_override: Option<Arc<dyn LocalSink>>,
    clock: RecordClock,
    metrics: Arc<MetricsCollector>,
    state: RwLock<Option<Arc<Pipeline>>>,
}

struct Pipeline {
    config: LoggerConfig,
    queue: Arc<BatchQueue>,
    history: Arc<DecisionHistory>,
    outcomes: Arc<OutcomeTracker>,
    scheduler: Mutex<Option<FlushScheduler>>,
}

/// Result of [`DecisionLogger::log_decision_batch`].
#[derive(Debug, Default)]
pub struct BatchReceipt {
    /// Ids of accepted decisions, in input order.
    pub ids: Vec<String>,
    /// Input position and reason of every rejected decision.
    pub rejected: Vec<(usize, LoggerError)>,
}

/// Coarse health of the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    /// Elevated error rate or a growing backlog.
    Degraded,
    /// Not initialized.
    Stopped,
}

/// Status report returned by [`DecisionLogger::get_status`].
#[derive(Debug, Clone, Serialize)]
pub struct LoggerStatus {
    pub initialized: bool,
    pub remote_enabled: bool,
    pub local_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_log_path: Option<PathBuf>,
    pub health: Health,
    pub metrics: MetricsSnapshot,
}

impl DecisionLogger {
    /// Create an uninitialized logger submitting to `remote`.
    pub fn new(remote: Arc<dyn ConsensusSink>) -> Self {
        Self {
            remote,
            local_override: None,
            clock: RecordClock::new(),
            metrics: Arc::new(MetricsCollector::new()),
            state: RwLock::new(None),
        }
    }

    /// Create a logger backed by an in-process consensus log.
    pub fn in_memory(consensus: &ConsensusConfig) -> (Self, Arc<InMemoryConsensusLog>) {
        let log = Arc::new(InMemoryConsensusLog::new(consensus));
        (Self::new(log.clone()), log)
    }

    /// Use `local` instead of a [`FileSink`] at `local_log_path`.
    pub fn with_local_sink(mut self, local: Arc<dyn LocalSink>) -> Self {
        self.local_override = Some(local);
        self
    }

    fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn running(&self) -> Result<Arc<Pipeline>, LoggerError> {
        self.pipeline().ok_or(LoggerError::NotInitialized)
    }

    /// Validate `config`, wire the sinks and start the flush scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn initialize(&self, config: LoggerConfig) -> Result<(), LoggerError> {
        config.validate()?;

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.is_some() {
            return Err(LoggerError::AlreadyInitialized);
        }

        let local: Option<Arc<dyn LocalSink>> = if config.enable_local_logging {
            match &self.local_override {
                Some(sink) => Some(sink.clone()),
                None => Some(Arc::new(FileSink::new(
                    &config.local_log_path,
                    config.max_segment_bytes,
                ))),
            }
        } else {
            None
        };
        let remote = config
            .enable_remote_logging
            .then(|| self.remote.clone());

        self.metrics.reset();
        let queue = Arc::new(BatchQueue::new(config.batch_size));
        let history = Arc::new(DecisionHistory::new(config.retention.clone()));
        let outcomes = Arc::new(OutcomeTracker::new(history.clone(), self.metrics.clone()));

        let flusher = Arc::new(Flusher {
            config: config.clone(),
            queue: queue.clone(),
            history: history.clone(),
            outcomes: outcomes.clone(),
            metrics: self.metrics.clone(),
            remote,
            local,
            retries: Default::default(),
        });
        let scheduler = FlushScheduler::spawn(flusher);

        tracing::info!(
            batch_size = config.batch_size,
            batch_timeout_ms = config.batch_timeout_ms,
            max_retries = config.max_retries,
            remote = config.enable_remote_logging,
            local = config.enable_local_logging,
            "Decision logger initialized"
        );

        *state = Some(Arc::new(Pipeline {
            config,
            queue,
            history,
            outcomes,
            scheduler: Mutex::new(Some(scheduler)),
        }));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.pipeline().is_some()
    }

    /// Log a decision and return its id.
    ///
    /// The decision is queued; persistence happens in the background.
    pub fn log_decision(&self, decision: Decision) -> Result<String, LoggerError> {
        let pipeline = self.running()?;
        self.enqueue(&pipeline, decision)
    }

    fn enqueue(&self, pipeline: &Pipeline, decision: Decision) -> Result<String, LoggerError> {
        let max_reasoning = pipeline.config.max_reasoning_bytes;

        let result = pipeline.queue.enqueue_with(|| {
            let mut record = DecisionRecord::create(decision, &self.clock, max_reasoning)?;
            record.status = DecisionStatus::Queued;
            pipeline.history.insert(record.clone());
            Ok(record)
        });

        match result {
            Ok(record) => {
                if record.reasoning_truncated {
                    tracing::warn!(
                        decision_id = %record.id,
                        original_bytes = record.reasoning_original_bytes,
                        "Decision reasoning truncated"
                    );
                }
                tracing::debug!(
                    decision_id = %record.id,
                    decision_type = %record.decision_type,
                    confidence = record.confidence,
                    "Decision queued"
                );
                Ok(record.id)
            }
            Err(e @ LoggerError::InvalidDecision(_)) => {
                self.metrics.record_rejected();
                tracing::warn!(error = %e, "Decision rejected");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Log a decision given as loosely-typed JSON.
    pub fn log_decision_value(&self, value: serde_json::Value) -> Result<String, LoggerError> {
        self.running()?;
        match Decision::from_value(value) {
            Ok(decision) => self.log_decision(decision),
            Err(e) => {
                self.metrics.record_rejected();
                Err(e)
            }
        }
    }

    /// Log several decisions, keeping input order.
    ///
    /// Invalid decisions are skipped and reported in the receipt; the rest
    /// are logged.
    pub fn log_decision_batch<I>(&self, decisions: I) -> Result<BatchReceipt, LoggerError>
    where
        I: IntoIterator<Item = Decision>,
    {
        self.running()?;
        let mut receipt = BatchReceipt::default();
        for (index, decision) in decisions.into_iter().enumerate() {
            match self.log_decision(decision) {
                Ok(id) => receipt.ids.push(id),
                Err(e @ LoggerError::InvalidDecision(_)) => receipt.rejected.push((index, e)),
                Err(e) => return Err(e),
            }
        }
        if !receipt.rejected.is_empty() {
            tracing::warn!(
                accepted = receipt.ids.len(),
                rejected = receipt.rejected.len(),
                "Decision batch partially rejected"
            );
        }
        Ok(receipt)
    }

    /// Attach an outcome to a logged decision.
    ///
    /// Returns false if the decision is unknown (or the logger is stopped).
    pub fn log_decision_outcome(&self, decision_id: &str, result: serde_json::Value) -> bool {
        match self.pipeline() {
            Some(pipeline) => pipeline.outcomes.log_outcome(decision_id, result),
            None => false,
        }
    }

    pub fn get_decision(&self, id: &str) -> Option<DecisionRecord> {
        self.pipeline()?.history.get(id)
    }

    /// Retained decisions matching `filter`, oldest first.
    pub fn get_decisions(&self, filter: &DecisionFilter) -> Vec<DecisionRecord> {
        self.pipeline()
            .map(|pipeline| pipeline.history.query(filter))
            .unwrap_or_default()
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        match self.pipeline() {
            Some(pipeline) => self
                .metrics
                .snapshot(pipeline.queue.len(), pipeline.history.len()),
            None => self.metrics.snapshot(0, 0),
        }
    }

    pub fn get_status(&self) -> LoggerStatus {
        let pipeline = self.pipeline();
        let metrics = self.get_metrics();

        let (health, remote_enabled, local_enabled, local_log_path) = match &pipeline {
            Some(pipeline) => {
                let config = &pipeline.config;
                let backlog_limit = config.batch_size.saturating_mul(DEGRADED_BACKLOG_BATCHES);
                let health = if metrics.error_rate > DEGRADED_ERROR_RATE
                    || metrics.queue_size > backlog_limit
                {
                    Health::Degraded
                } else {
                    Health::Healthy
                };
                let local_log_path = (config.enable_local_logging
                    && self.local_override.is_none())
                .then(|| config.local_log_path.clone());
                (
                    health,
                    config.enable_remote_logging,
                    config.enable_local_logging,
                    local_log_path,
                )
            }
            None => (Health::Stopped, false, false, None),
        };

        LoggerStatus {
            initialized: pipeline.is_some(),
            remote_enabled,
            local_enabled,
            local_log_path,
            health,
            metrics,
        }
    }

    /// Stop the scheduler after a final flush, then drop all queued, retained
    /// and tracked state.
    ///
    /// Further `log_decision` calls fail with [`LoggerError::NotInitialized`]
    /// until the logger is initialized again. Calling this on a stopped logger
    /// does nothing.
    pub async fn shutdown(&self) {
        let pipeline = self
            .state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(pipeline) = pipeline else {
            return;
        };

        // Callers still holding the pipeline get NotInitialized from here on.
        pipeline.queue.close();

        let scheduler = pipeline
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }

        let dropped = pipeline.queue.clear();
        for record in &dropped {
            tracing::warn!(decision_id = %record.id, "Decision dropped at shutdown");
            self.metrics.record_attempt(false, Duration::ZERO);
        }
        pipeline.history.clear();
        pipeline.outcomes.clear();

        let metrics = self.metrics.snapshot(0, 0);
        tracing::info!(
            total = metrics.total_decisions,
            successful = metrics.successful_logs,
            failed = metrics.failed_logs,
            "Decision logger shut down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quiet_config() -> LoggerConfig {
        LoggerConfig {
            batch_size: 100,
            batch_timeout_ms: 60_000,
            enable_local_logging: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let (logger, _) = DecisionLogger::in_memory(&ConsensusConfig::default());
        assert!(!logger.is_initialized());
        assert!(matches!(
            logger.log_decision(Decision::new("STRATEGY_CHANGE")),
            Err(LoggerError::NotInitialized)
        ));
        assert!(!logger.log_decision_outcome("abc", json!({})));
        assert_eq!(logger.get_status().health, Health::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let (logger, _) = DecisionLogger::in_memory(&ConsensusConfig::default());
        let result = logger
            .initialize(LoggerConfig {
                batch_size: 0,
                ..quiet_config()
            })
            .await;
        assert!(matches!(result, Err(LoggerError::Configuration(_))));
        assert!(!logger.is_initialized());
    }

    #[tokio::test]
    async fn test_double_initialize_rejected() {
        let (logger, _) = DecisionLogger::in_memory(&ConsensusConfig::default());
        logger.initialize(quiet_config()).await.unwrap();
        assert!(matches!(
            logger.initialize(quiet_config()).await,
            Err(LoggerError::AlreadyInitialized)
        ));
        logger.shutdown().await;
    }

    #[tokio::test]
    async fn test_queued_decision_is_visible() {
        let (logger, _) = DecisionLogger::in_memory(&ConsensusConfig::default());
        logger.initialize(quiet_config()).await.unwrap();

        let id = logger
            .log_decision(Decision::new("RISK_ASSESSMENT").confidence(0.4))
            .unwrap();
        let record = logger.get_decision(&id).unwrap();
        assert_eq!(record.status, DecisionStatus::Queued);

        let metrics = logger.get_metrics();
        assert_eq!(metrics.queue_size, 1);
        assert_eq!(metrics.history_size, 1);

        logger.shutdown().await;
    }

    #[tokio::test]
    async fn test_value_input_rejections_are_counted() {
        let (logger, _) = DecisionLogger::in_memory(&ConsensusConfig::default());
        logger.initialize(quiet_config()).await.unwrap();

        assert!(matches!(
            logger.log_decision_value(serde_json::Value::Null),
            Err(LoggerError::InvalidDecision(_))
        ));
        assert!(logger.log_decision_value(json!({"type": "X"})).is_ok());
        assert_eq!(logger.get_metrics().rejected_decisions, 1);

        logger.shutdown().await;
    }

    #[tokio::test]
    async fn test_enqueue_racing_shutdown_is_refused() {
        let (logger, log) = DecisionLogger::in_memory(&ConsensusConfig::default());
        logger.initialize(quiet_config()).await.unwrap();
        logger.log_decision(Decision::new("EARLY")).unwrap();

        // A caller that looked up the pipeline just before shutdown.
        let stale = logger.running().unwrap();
        logger.shutdown().await;

        assert!(matches!(
            logger.enqueue(&stale, Decision::new("LATE")),
            Err(LoggerError::NotInitialized)
        ));
        assert!(stale.queue.is_empty());
        assert_eq!(log.len(), 1);

        let metrics = logger.get_metrics();
        assert_eq!(metrics.total_decisions, 1);
        assert_eq!(metrics.successful_logs, 1);
        assert_eq!(metrics.rejected_decisions, 0);
    }

    #[tokio::test]
    async fn test_status_reports_configuration() {
        let (logger, _) = DecisionLogger::in_memory(&ConsensusConfig::default());
        logger.initialize(quiet_config()).await.unwrap();

        let status = logger.get_status();
        assert!(status.initialized);
        assert!(status.remote_enabled);
        assert!(!status.local_enabled);
        assert!(status.local_log_path.is_none());
        assert_eq!(status.health, Health::Healthy);

        logger.shutdown().await;
        assert_eq!(logger.get_status().health, Health::Stopped);
    }
}
