//! Outcome tracking.
//!
//! Outcomes are attached to decisions already held in history. Attached
//! outcomes are also queued for the local log and written by the flush worker.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::history::DecisionHistory;
use crate::metrics::MetricsCollector;
use crate::record::OutcomeRecord;

/// Attaches late-arriving results to logged decisions.
pub struct OutcomeTracker {
    history: Arc<DecisionHistory>,
    metrics: Arc<MetricsCollector>,
    unwritten: Mutex<Vec<OutcomeRecord>>,
}

impl OutcomeTracker {
    pub fn new(history: Arc<DecisionHistory>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            history,
            metrics,
            unwritten: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutcomeRecord>> {
        self.unwritten.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach `result` to decision `decision_id`.
    ///
    /// Returns false, changing nothing, if the decision is not in history.
    /// A later outcome for the same decision replaces the earlier one.
    pub fn log_outcome(&self, decision_id: &str, result: serde_json::Value) -> bool {
        let outcome = OutcomeRecord::new(decision_id, result);
        let attached = self.history.update(decision_id, |record| {
            if record.outcome.is_some() {
                tracing::debug!(decision_id = %decision_id, "Replacing decision outcome");
            }
            record.outcome = Some(outcome.clone());
        });

        if !attached {
            tracing::debug!(decision_id = %decision_id, "Outcome for unknown decision ignored");
            return false;
        }

        self.metrics.record_outcome();
        self.lock().push(outcome);
        true
    }

    /// Take the outcomes not yet written to the local log.
    pub fn take_unwritten(&self) -> Vec<OutcomeRecord> {
        std::mem::take(&mut *self.lock())
    }

    pub fn unwritten_len(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
