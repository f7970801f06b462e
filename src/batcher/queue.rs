//! Per-priority FIFO queues with independent locks.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::priority::Priority;

/// A set of three FIFO queues, one per [`Priority`] level.
///
/// Each queue has its own mutex, so producers at different priorities never
/// contend with each other. No operation holds more than one queue lock at
/// a time.
pub struct PriorityQueueSet<T> {
    queues: [Mutex<VecDeque<Arc<T>>>; Priority::COUNT],
}

impl<T> PriorityQueueSet<T> {
    /// Create an empty queue set.
    pub fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| Mutex::new(VecDeque::new())),
        }
    }

    /// Append one item to the tail of the queue for `prio`.
    pub fn push(&self, cargo: Arc<T>, prio: Priority) {
        self.queues[prio.index()].lock().push_back(cargo);
    }

    /// Append all items to the queue for `prio` under a single lock
    /// acquisition, so they become visible to other observers atomically.
    pub fn push_many(&self, cargo: Vec<Arc<T>>, prio: Priority) {
        let mut queue = self.queues[prio.index()].lock();
        queue.extend(cargo);
    }

    /// Move up to `remaining` items from the head of the queue for `prio`
    /// to the tail of `batch`. `remaining == 0` means no limit.
    ///
    /// Returns the number of items moved.
    pub fn drain_into(&self, batch: &mut Vec<Arc<T>>, prio: Priority, remaining: usize) -> usize {
        let mut queue = self.queues[prio.index()].lock();
        let take = if remaining == 0 {
            queue.len()
        } else {
            remaining.min(queue.len())
        };
        batch.extend(queue.drain(..take));
        take
    }

    /// Whether the queue for `prio` has no items. May be stale the moment
    /// it returns.
    pub fn is_empty(&self, prio: Priority) -> bool {
        self.queues[prio.index()].lock().is_empty()
    }

    /// Number of items queued for `prio`. May be stale the moment it
    /// returns.
    pub fn len(&self, prio: Priority) -> usize {
        self.queues[prio.index()].lock().len()
    }

    /// Drop all queued items, highest priority first, taking one lock at a
    /// time. Returns the total number of items dropped.
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        for prio in Priority::descending() {
            let mut queue = self.queues[prio.index()].lock();
            dropped += queue.len();
            queue.clear();
        }
        dropped
    }
}

impl<T> Default for PriorityQueueSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
