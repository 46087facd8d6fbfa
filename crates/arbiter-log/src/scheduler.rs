//! Flush worker and scheduler.
//!
//! A single background task sweeps the queue whenever a batch fills up or the
//! oldest record has waited `batch_timeout`, and writes each batch to the
//! remote and local sinks concurrently. Batches are processed one at a time,
//! so batch N is fully offered to both sinks before batch N+1.
//!
//! Records whose remote submission fails transiently go back to `QUEUED` and
//! wait out their backoff on a retry list. The task keeps flushing new
//! batches meanwhile, so retries of batch N may land after batch N+1.

use arbiter_core::LoggerConfig;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::SinkError;
use crate::history::DecisionHistory;
use crate::local::LocalSink;
use crate::metrics::MetricsCollector;
use crate::outcome::OutcomeTracker;
use crate::queue::BatchQueue;
use crate::record::{DecisionRecord, DecisionStatus, LedgerEntry, RemoteAck};
use crate::remote::ConsensusSink;

/// Remote result of one submission attempt for one record.
#[derive(Debug, Clone)]
enum Attempt {
    Acked(RemoteAck),
    Rejected(String),
    Transient(String),
}

/// Final result for one record.
enum Settlement {
    Acked { ack: RemoteAck, attempts: u32 },
    Failed { reason: String, attempts: u32 },
    /// Remote logging disabled; the local write decides.
    LocalOnly,
}

/// A record waiting out its backoff before the next remote attempt.
pub(crate) struct PendingRetry {
    record: DecisionRecord,
    payload: Vec<u8>,
    attempts: u32,
    local_ok: Option<bool>,
    first_flushed: Instant,
    not_before: Instant,
}

/// Writes batches to the sinks and folds the results back into history and
/// metrics.
pub(crate) struct Flusher {
    pub(crate) config: LoggerConfig,
    pub(crate) queue: Arc<BatchQueue>,
    pub(crate) history: Arc<DecisionHistory>,
    pub(crate) outcomes: Arc<OutcomeTracker>,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) remote: Option<Arc<dyn ConsensusSink>>,
    pub(crate) local: Option<Arc<dyn LocalSink>>,
    pub(crate) retries: Mutex<VecDeque<PendingRetry>>,
}

impl Flusher {
    fn pending(&self) -> MutexGuard<'_, VecDeque<PendingRetry>> {
        self.retries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sweep and write one batch. Returns the number of records flushed.
    pub(crate) async fn flush_once(&self) -> usize {
        let batch = self.queue.drain_batch();
        if batch.is_empty() {
            return 0;
        }
        let count = batch.len();
        self.flush_batch(batch).await;
        count
    }

    /// Flush until the queue is empty, then see every pending retry through.
    pub(crate) async fn flush_all(&self) -> usize {
        let mut total = 0;
        loop {
            let flushed = self.flush_once().await;
            if flushed == 0 {
                break;
            }
            total += flushed;
        }
        while let Some(at) = self.next_retry_at() {
            tokio::time::sleep_until(at).await;
            self.flush_retries().await;
        }
        total
    }

    /// When the earliest pending retry becomes due.
    pub(crate) fn next_retry_at(&self) -> Option<Instant> {
        self.pending().iter().map(|retry| retry.not_before).min()
    }

    async fn flush_batch(&self, batch: Vec<DecisionRecord>) {
        let started = Instant::now();
        tracing::debug!(records = batch.len(), "Flushing decision batch");

        let (remote, local) = tokio::join!(self.first_attempt(&batch), self.append_local(&batch));

        let mut succeeded = 0usize;
        let mut retrying = 0usize;
        for (index, record) in batch.into_iter().enumerate() {
            let local_ok = local.as_ref().map(|results| results[index]);
            let settlement = match remote.as_ref().map(|results| &results[index]) {
                None => Settlement::LocalOnly,
                Some((_, Attempt::Acked(ack))) => Settlement::Acked {
                    ack: ack.clone(),
                    attempts: 1,
                },
                Some((_, Attempt::Rejected(reason))) => Settlement::Failed {
                    reason: reason.clone(),
                    attempts: 1,
                },
                Some((payload, Attempt::Transient(reason))) => {
                    let payload = payload.clone();
                    match self.schedule_retry(record, payload, 1, local_ok, started, reason) {
                        Ok(()) => {
                            retrying += 1;
                            continue;
                        }
                        Err((record, settlement)) => {
                            self.settle(&record, settlement, local_ok, started.elapsed());
                            continue;
                        }
                    }
                }
            };
            if self.settle(&record, settlement, local_ok, started.elapsed()) {
                succeeded += 1;
            }
        }

        self.metrics.record_batch();
        tracing::info!(
            succeeded,
            retrying,
            latency_ms = started.elapsed().as_millis() as u64,
            "Decision batch flushed"
        );
    }

    /// Resubmit every retry whose backoff has elapsed, in the order the
    /// records originally reached the remote log.
    pub(crate) async fn flush_retries(&self) -> usize {
        let Some(sink) = self.remote.as_ref() else {
            return 0;
        };
        let now = Instant::now();
        let due: Vec<PendingRetry> = {
            let mut pending = self.pending();
            let (due, waiting): (VecDeque<_>, VecDeque<_>) =
                pending.drain(..).partition(|retry| retry.not_before <= now);
            *pending = waiting;
            due.into()
        };
        if due.is_empty() {
            return 0;
        }

        let count = due.len();
        let payloads: Vec<Vec<u8>> = due.iter().map(|retry| retry.payload.clone()).collect();
        let attempts = submit_attempt(sink.as_ref(), &payloads).await;

        for (retry, attempt) in due.into_iter().zip(attempts) {
            let attempts = retry.attempts + 1;
            let settlement = match attempt {
                Attempt::Acked(ack) => Settlement::Acked { ack, attempts },
                Attempt::Rejected(reason) => Settlement::Failed { reason, attempts },
                Attempt::Transient(reason) => {
                    match self.schedule_retry(
                        retry.record,
                        retry.payload,
                        attempts,
                        retry.local_ok,
                        retry.first_flushed,
                        &reason,
                    ) {
                        Ok(()) => continue,
                        Err((record, settlement)) => {
                            let latency = retry.first_flushed.elapsed();
                            self.settle(&record, settlement, retry.local_ok, latency);
                            continue;
                        }
                    }
                }
            };
            let latency = retry.first_flushed.elapsed();
            self.settle(&retry.record, settlement, retry.local_ok, latency);
        }
        count
    }

    /// Queue `record` for another attempt, or hand it back as failed once
    /// `attempts` exceeds the retry budget.
    fn schedule_retry(
        &self,
        mut record: DecisionRecord,
        payload: Vec<u8>,
        attempts: u32,
        local_ok: Option<bool>,
        first_flushed: Instant,
        reason: &str,
    ) -> Result<(), (DecisionRecord, Settlement)> {
        if attempts > self.config.max_retries {
            tracing::error!(
                decision_id = %record.id,
                attempts,
                error = %reason,
                "Remote submission retries exhausted"
            );
            let settlement = Settlement::Failed {
                reason: reason.to_string(),
                attempts,
            };
            return Err((record, settlement));
        }

        let backoff = self.config.retry_backoff(attempts);
        tracing::warn!(
            decision_id = %record.id,
            attempt = attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %reason,
            "Remote submission failed, retrying"
        );
        self.history.update(&record.id, |stored| {
            stored.status = DecisionStatus::Queued;
            stored.attempts = attempts;
            stored.local_logged = local_ok.unwrap_or(false);
        });
        record.attempts = attempts;
        self.metrics.record_retries(1);
        self.pending().push_back(PendingRetry {
            record,
            payload,
            attempts,
            local_ok,
            first_flushed,
            not_before: Instant::now() + backoff,
        });
        Ok(())
    }

    /// Record the final result of `record`. Returns whether it succeeded.
    fn settle(
        &self,
        record: &DecisionRecord,
        settlement: Settlement,
        local_ok: Option<bool>,
        latency: Duration,
    ) -> bool {
        let success = match &settlement {
            Settlement::Acked { .. } => true,
            Settlement::Failed { .. } => false,
            Settlement::LocalOnly => local_ok.unwrap_or(true),
        };

        self.history.update(&record.id, |stored| {
            stored.local_logged = local_ok.unwrap_or(false);
            match &settlement {
                Settlement::Acked { ack, attempts } => {
                    stored.remote_ref = Some(ack.clone());
                    stored.attempts = *attempts;
                }
                Settlement::Failed { reason, attempts } => {
                    stored.failure = Some(reason.clone());
                    stored.attempts = *attempts;
                }
                Settlement::LocalOnly => {}
            }
            if !success && stored.failure.is_none() {
                stored.failure = Some("local append failed".to_string());
            }
            stored.status = if success {
                DecisionStatus::Submitted
            } else {
                DecisionStatus::Failed
            };
        });

        if !success {
            tracing::warn!(
                decision_id = %record.id,
                decision_type = %record.decision_type,
                "Decision could not be logged"
            );
        }
        self.metrics.record_attempt(success, latency);
        success
    }

    /// First remote attempt for a fresh batch, paired with each payload.
    ///
    /// Returns `None` when remote logging is disabled.
    async fn first_attempt(&self, batch: &[DecisionRecord]) -> Option<Vec<(Vec<u8>, Attempt)>> {
        let sink = self.remote.as_ref()?;
        let mut slots: Vec<(Vec<u8>, Option<Attempt>)> = Vec::with_capacity(batch.len());
        let mut payloads = Vec::with_capacity(batch.len());
        for record in batch {
            match record.to_payload() {
                Ok(payload) => {
                    payloads.push(payload.clone());
                    slots.push((payload, None));
                }
                Err(e) => {
                    let attempt = Attempt::Rejected(format!("serialization failed: {e}"));
                    slots.push((Vec::new(), Some(attempt)));
                }
            }
        }

        let mut attempts = submit_attempt(sink.as_ref(), &payloads).await.into_iter();
        Some(
            slots
                .into_iter()
                .map(|(payload, settled)| {
                    let attempt = settled.or_else(|| attempts.next()).unwrap_or_else(|| {
                        Attempt::Transient("missing acknowledgement".to_string())
                    });
                    (payload, attempt)
                })
                .collect(),
        )
    }

    /// Append every record of a batch to the local log, in order.
    ///
    /// Returns `None` when local logging is disabled.
    async fn append_local(&self, batch: &[DecisionRecord]) -> Option<Vec<bool>> {
        let sink = self.local.as_ref()?;
        let mut results = Vec::with_capacity(batch.len());
        for record in batch {
            let ok = match sink.append(&LedgerEntry::Decision(record.clone())).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(decision_id = %record.id, error = %e, "Local log append failed");
                    false
                }
            };
            self.metrics.record_local(ok);
            results.push(ok);
        }
        Some(results)
    }

    /// Write outcomes attached since the last cycle to the local log.
    pub(crate) async fn write_outcomes(&self) {
        let outcomes = self.outcomes.take_unwritten();
        let Some(sink) = self.local.as_ref() else {
            return;
        };
        for outcome in outcomes {
            let decision_id = outcome.decision_id.clone();
            let ok = match sink.append(&LedgerEntry::Outcome(outcome)).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(decision_id = %decision_id, error = %e, "Local outcome append failed");
                    false
                }
            };
            self.metrics.record_local(ok);
        }
    }
}

/// One submission of `payloads`, mapped to a per-payload attempt result.
async fn submit_attempt(sink: &dyn ConsensusSink, payloads: &[Vec<u8>]) -> Vec<Attempt> {
    if payloads.is_empty() {
        return Vec::new();
    }
    match sink.submit_batch(payloads).await {
        Ok(results) => {
            let mut results = results.into_iter();
            payloads
                .iter()
                .map(|_| match results.next() {
                    Some(Ok(ack)) => Attempt::Acked(ack),
                    Some(Err(e)) if e.is_transient() => Attempt::Transient(e.reason().to_string()),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Remote log rejected decision");
                        Attempt::Rejected(e.reason().to_string())
                    }
                    None => Attempt::Transient("missing acknowledgement".to_string()),
                })
                .collect()
        }
        Err(SinkError::Transient(reason)) => vec![Attempt::Transient(reason); payloads.len()],
        Err(SinkError::Permanent(reason)) => {
            tracing::warn!(records = payloads.len(), error = %reason, "Remote log rejected batch");
            vec![Attempt::Rejected(reason); payloads.len()]
        }
    }
}

/// Handle to the background flush task.
pub(crate) struct FlushScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FlushScheduler {
    /// Start the flush task on the current tokio runtime.
    pub(crate) fn spawn(flusher: Arc<Flusher>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(flusher, shutdown_rx));
        Self { shutdown, handle }
    }

    /// Stop the task after a final flush of everything still queued.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Flush scheduler task failed");
        }
    }
}

async fn retry_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn check_interval(timeout: Duration) -> Duration {
    (timeout / 4).clamp(Duration::from_millis(5), Duration::from_secs(1))
}

async fn run(flusher: Arc<Flusher>, mut shutdown: watch::Receiver<bool>) {
    let timeout = flusher.config.batch_timeout();
    let mut ticker = tokio::time::interval(check_interval(timeout));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(
        batch_size = flusher.queue.batch_size(),
        batch_timeout_ms = timeout.as_millis() as u64,
        "Flush scheduler started"
    );

    loop {
        let next_retry = flusher.next_retry_at();
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = flusher.queue.wait_full() => {}
            _ = ticker.tick() => {}
            _ = retry_due(next_retry) => {}
        }

        while flusher.queue.is_due(timeout) {
            if flusher.flush_once().await == 0 {
                break;
            }
        }
        flusher.flush_retries().await;
        flusher.write_outcomes().await;
    }

    let flushed = flusher.flush_all().await;
    flusher.write_outcomes().await;
    tracing::debug!(flushed, "Flush scheduler stopped");
}
