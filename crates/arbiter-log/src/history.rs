//! In-memory decision history.
//!
//! Every ingested record is retained here, keyed by id, so lookups and late
//! outcomes can find it. Retention is bounded by entry count (oldest evicted
//! first) and optionally by age.

use arbiter_core::RetentionConfig;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::record::{DecisionRecord, DecisionStatus};

/// Filter for querying decision history.
///
/// Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct DecisionFilter {
    /// Exact decision type.
    pub decision_type: Option<String>,
    /// Exact strategy.
    pub strategy: Option<String>,
    /// Inclusive lower bound on confidence.
    pub min_confidence: Option<f64>,
    /// Lifecycle status.
    pub status: Option<DecisionStatus>,
    /// Maximum number of results (oldest first).
    pub limit: Option<usize>,
}

impl DecisionFilter {
    pub fn decision_type(mut self, decision_type: impl Into<String>) -> Self {
        self.decision_type = Some(decision_type.into());
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn status(mut self, status: DecisionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &DecisionRecord) -> bool {
        if let Some(ref decision_type) = self.decision_type {
            if &record.decision_type != decision_type {
                return false;
            }
        }
        if let Some(ref strategy) = self.strategy {
            if record.strategy.as_ref() != Some(strategy) {
                return false;
            }
        }
        if let Some(min) = self.min_confidence {
            if record.confidence < min {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        true
    }
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, DecisionRecord>,
    /// Ids in ingestion order.
    order: VecDeque<String>,
}

/// Retained decision records.
pub struct DecisionHistory {
    retention: RetentionConfig,
    inner: Mutex<Inner>,
}

impl DecisionHistory {
    pub fn new(retention: RetentionConfig) -> Self {
        Self {
            retention,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Retain a record, evicting what retention no longer allows.
    pub fn insert(&self, record: DecisionRecord) {
        let mut inner = self.lock();
        if inner.records.insert(record.id.clone(), record.clone()).is_none() {
            inner.order.push_back(record.id);
        }
        self.evict(&mut inner);
    }

    pub fn get(&self, id: &str) -> Option<DecisionRecord> {
        let mut inner = self.lock();
        self.evict(&mut inner);
        inner.records.get(id).cloned()
    }

    /// Apply `update` to the record with `id`. Returns false if it is not retained.
    pub fn update<F>(&self, id: &str, update: F) -> bool
    where
        F: FnOnce(&mut DecisionRecord),
    {
        let mut inner = self.lock();
        self.evict(&mut inner);
        match inner.records.get_mut(id) {
            Some(record) => {
                update(record);
                true
            }
            None => false,
        }
    }

    /// Records matching `filter`, oldest first.
    pub fn query(&self, filter: &DecisionFilter) -> Vec<DecisionRecord> {
        let mut inner = self.lock();
        self.evict(&mut inner);
        let limit = filter.limit.unwrap_or(usize::MAX);
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        let mut inner = self.lock();
        self.evict(&mut inner);
        inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.records.clear();
        inner.order.clear();
    }

    fn evict(&self, inner: &mut Inner) {
        let ttl = self
            .retention
            .ttl_secs
            .and_then(|secs| chrono::Duration::try_seconds(i64::try_from(secs).ok()?));
        if let Some(ttl) = ttl {
            let cutoff = Utc::now() - ttl;
            while let Some(id) = inner.order.front() {
                let expired = inner
                    .records
                    .get(id)
                    .is_none_or(|record| record.created_at < cutoff);
                if !expired {
                    break;
                }
                if let Some(id) = inner.order.pop_front() {
                    inner.records.remove(&id);
                }
            }
        }

        let max = self.retention.max_entries;
        if max > 0 {
            while inner.order.len() > max {
                if let Some(id) = inner.order.pop_front() {
                    tracing::trace!(decision_id = %id, "Evicting decision from history");
                    inner.records.remove(&id);
                }
            }
        }
    }
}
