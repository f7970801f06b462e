//! Counters for observing batcher activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a running [`Batcher`](super::Batcher).
///
/// All counters are updated with relaxed atomics; readers get a consistent
/// enough picture for monitoring, not a transactional one.
#[derive(Debug, Default)]
pub struct BatcherMetrics {
    /// Requests accepted by `push` / `push_many`.
    pub requests_pushed: AtomicU64,

    /// Requests currently sitting in the queues.
    pub requests_queued: AtomicU64,

    /// Requests handed to the consumer.
    pub requests_delivered: AtomicU64,

    /// Requests dropped by `clear`.
    pub requests_cleared: AtomicU64,

    /// Batches handed to the consumer.
    pub batches_delivered: AtomicU64,

    /// Highest queue depth observed across all priorities.
    pub max_queue_depth: AtomicU64,
}

impl BatcherMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` requests entering the queues.
    pub fn record_pushed(&self, count: usize) {
        self.requests_pushed.fetch_add(count as u64, Ordering::Relaxed);
        let depth = self.requests_queued.fetch_add(count as u64, Ordering::Relaxed) + count as u64;
        let mut current_max = self.max_queue_depth.load(Ordering::Relaxed);
        while depth > current_max {
            match self.max_queue_depth.compare_exchange_weak(
                current_max,
                depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => current_max = x,
            }
        }
    }

    /// Record a batch of `len` requests handed to the consumer.
    pub fn record_delivered(&self, len: usize) {
        self.requests_queued.fetch_sub(len as u64, Ordering::Relaxed);
        self.requests_delivered.fetch_add(len as u64, Ordering::Relaxed);
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` queued requests dropped by `clear`.
    pub fn record_cleared(&self, count: usize) {
        self.requests_queued.fetch_sub(count as u64, Ordering::Relaxed);
        self.requests_cleared.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Current total queue depth.
    pub fn queue_depth(&self) -> u64 {
        self.requests_queued.load(Ordering::Relaxed)
    }

    /// Average requests per delivered batch.
    pub fn avg_batch_size(&self) -> f64 {
        let batches = self.batches_delivered.load(Ordering::Relaxed);
        if batches == 0 {
            return 0.0;
        }
        let delivered = self.requests_delivered.load(Ordering::Relaxed);
        delivered as f64 / batches as f64
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_pushed: self.requests_pushed.load(Ordering::Relaxed),
            requests_queued: self.requests_queued.load(Ordering::Relaxed),
            requests_delivered: self.requests_delivered.load(Ordering::Relaxed),
            requests_cleared: self.requests_cleared.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
            avg_batch_size: self.avg_batch_size(),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_pushed: u64,
    pub requests_queued: u64,
    pub requests_delivered: u64,
    pub requests_cleared: u64,
    pub batches_delivered: u64,
    pub max_queue_depth: u64,
    pub avg_batch_size: f64,
}
