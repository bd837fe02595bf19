//! Progress reporting for the per-item loop.

use std::sync::atomic::{AtomicI64, Ordering};

use tracing::warn;

use crate::jobs::JobStore;

/// Events emitted by the pipeline while items are being composed.
pub enum ProgressEvent {
    Item { processed: i64, failed: i64 },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Persists counters at a fixed cadence (every N processed or N failed
/// items) so a concurrent status reader sees monotonic progress without
/// waiting for completion. The exact final counts are written by the
/// terminal transition, not here.
pub struct CheckpointProgress {
    store: JobStore,
    public_id: String,
    every: i64,
    last_processed: AtomicI64,
    last_failed: AtomicI64,
}

impl CheckpointProgress {
    pub fn new(store: JobStore, public_id: String, every: u64) -> Self {
        Self {
            store,
            public_id,
            every: every.max(1) as i64,
            last_processed: AtomicI64::new(0),
            last_failed: AtomicI64::new(0),
        }
    }
}

impl ProgressReporter for CheckpointProgress {
    fn report(&self, event: ProgressEvent) {
        let ProgressEvent::Item { processed, failed } = event;
        let since_processed = processed - self.last_processed.load(Ordering::Relaxed);
        let since_failed = failed - self.last_failed.load(Ordering::Relaxed);
        if since_processed < self.every && since_failed < self.every {
            return;
        }

        match self.store.checkpoint(&self.public_id, processed, failed) {
            Ok(()) => {
                self.last_processed.store(processed, Ordering::Relaxed);
                self.last_failed.store(failed, Ordering::Relaxed);
            }
            Err(e) => {
                // A missed checkpoint only delays what the next one shows.
                warn!(job_id = %self.public_id, error = %e, "Failed to persist progress checkpoint");
            }
        }
    }
}
