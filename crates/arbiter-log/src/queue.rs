//! Batch queue.
//!
//! Ingestion pushes records under a short-lived lock; the flush worker sweeps
//! them out in batches. A sweep is atomic with respect to concurrent pushes:
//! every record lands in exactly one batch.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::error::LoggerError;
use crate::record::DecisionRecord;

struct Queued {
    record: DecisionRecord,
    enqueued_at: Instant,
}

/// Ordered queue of records waiting to be flushed.
pub struct BatchQueue {
    batch_size: usize,
    items: Mutex<Items>,
    full: Notify,
}

#[derive(Default)]
struct Items {
    queued: VecDeque<Queued>,
    closed: bool,
}

impl BatchQueue {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            items: Mutex::new(Items::default()),
            full: Notify::new(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn lock(&self) -> MutexGuard<'_, Items> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Build a record and append it.
    ///
    /// `build` runs while the queue is locked, so the order records are built
    /// in (and their ingestion timestamps) matches queue order. Reaching
    /// `batch_size` wakes the flush worker. Fails with `NotInitialized`
    /// once the queue is closed, without calling `build`.
    pub fn enqueue_with<F>(&self, build: F) -> Result<DecisionRecord, LoggerError>
    where
        F: FnOnce() -> Result<DecisionRecord, LoggerError>,
    {
        let (record, len) = {
            let mut items = self.lock();
            if items.closed {
                return Err(LoggerError::NotInitialized);
            }
            let record = build()?;
            items.queued.push_back(Queued {
                record: record.clone(),
                enqueued_at: Instant::now(),
            });
            (record, items.queued.len())
        };

        if len >= self.batch_size {
            self.full.notify_one();
        }
        Ok(record)
    }

    /// Refuse further records. Already queued records stay for draining.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Remove up to `batch_size` records from the front.
    pub fn drain_batch(&self) -> Vec<DecisionRecord> {
        let mut items = self.lock();
        let take = items.queued.len().min(self.batch_size);
        items.queued.drain(..take).map(|q| q.record).collect()
    }

    /// Remove everything, returning the dropped records.
    pub fn clear(&self) -> Vec<DecisionRecord> {
        self.lock().queued.drain(..).map(|q| q.record).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a flush is due: a full batch is waiting, or the oldest record
    /// has waited at least `timeout`.
    pub fn is_due(&self, timeout: Duration) -> bool {
        let items = self.lock();
        if items.queued.len() >= self.batch_size {
            return true;
        }
        items
            .queued
            .front()
            .is_some_and(|q| q.enqueued_at.elapsed() >= timeout)
    }

    /// Wait until an enqueue fills a batch.
    pub async fn wait_full(&self) {
        self.full.notified().await;
    }
}
