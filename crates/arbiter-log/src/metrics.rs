//! Pipeline metrics.
//!
//! Counters are lock-free atomics updated from the ingestion and flush paths;
//! [`MetricsCollector::snapshot`] reads them into an immutable
//! [`MetricsSnapshot`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running counters for the decision pipeline.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_decisions: AtomicU64,
    successful_logs: AtomicU64,
    failed_logs: AtomicU64,
    batches_processed: AtomicU64,
    retries: AtomicU64,
    local_writes: AtomicU64,
    local_failures: AtomicU64,
    rejected_decisions: AtomicU64,
    outcomes_recorded: AtomicU64,
    total_latency_us: AtomicU64,
    last_flush_at: Mutex<Option<DateTime<Utc>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the final result of logging one decision.
    pub fn record_attempt(&self, success: bool, latency: Duration) {
        // `total_decisions` goes first so a concurrent snapshot never sees
        // more outcomes than attempts.
        self.total_decisions.fetch_add(1, Ordering::SeqCst);
        if success {
            self.successful_logs.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed_logs.fetch_add(1, Ordering::SeqCst);
        }
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        let mut last = self.last_flush_at.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(Utc::now());
    }

    pub fn record_retries(&self, count: usize) {
        self.retries.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_local(&self, success: bool) {
        if success {
            self.local_writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.local_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejected(&self) {
        self.rejected_decisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self) {
        self.outcomes_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.total_decisions,
            &self.successful_logs,
            &self.failed_logs,
            &self.batches_processed,
            &self.retries,
            &self.local_writes,
            &self.local_failures,
            &self.rejected_decisions,
            &self.outcomes_recorded,
            &self.total_latency_us,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        let mut last = self.last_flush_at.lock().unwrap_or_else(|e| e.into_inner());
        *last = None;
    }

    /// Point-in-time copy of the counters plus the given queue/history sizes.
    pub fn snapshot(&self, queue_size: usize, history_size: usize) -> MetricsSnapshot {
        let successful_logs = self.successful_logs.load(Ordering::SeqCst);
        let failed_logs = self.failed_logs.load(Ordering::SeqCst);
        let total_decisions = self
            .total_decisions
            .load(Ordering::SeqCst)
            .max(successful_logs + failed_logs);
        let total_latency_us = self.total_latency_us.load(Ordering::Relaxed);

        let (error_rate, average_latency_ms) = if total_decisions == 0 {
            (0.0, 0.0)
        } else {
            (
                (failed_logs as f64 / total_decisions as f64).clamp(0.0, 1.0),
                total_latency_us as f64 / 1000.0 / total_decisions as f64,
            )
        };

        MetricsSnapshot {
            total_decisions,
            successful_logs,
            failed_logs,
            batches_processed: self.batches_processed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            local_writes: self.local_writes.load(Ordering::Relaxed),
            local_failures: self.local_failures.load(Ordering::Relaxed),
            rejected_decisions: self.rejected_decisions.load(Ordering::Relaxed),
            outcomes_recorded: self.outcomes_recorded.load(Ordering::Relaxed),
            error_rate,
            average_latency_ms,
            queue_size,
            history_size,
            last_flush_at: *self.last_flush_at.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}

/// Immutable view of pipeline metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Decisions whose logging has concluded.
    pub total_decisions: u64,
    pub successful_logs: u64,
    pub failed_logs: u64,
    pub batches_processed: u64,
    /// Records resubmitted to the remote log.
    pub retries: u64,
    pub local_writes: u64,
    pub local_failures: u64,
    /// Decisions refused at ingestion.
    pub rejected_decisions: u64,
    pub outcomes_recorded: u64,
    /// `failed_logs / total_decisions`, 0 before any attempt.
    pub error_rate: f64,
    pub average_latency_ms: f64,
    /// Decisions waiting to be flushed.
    pub queue_size: usize,
    /// Decisions retained in history.
    pub history_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_flush_at: Option<DateTime<Utc>>,
}
