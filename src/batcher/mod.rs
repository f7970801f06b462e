//! Priority request queuing and paced batch delivery.
//!
//! Producers push individually owned requests tagged with a [`Priority`];
//! a dedicated worker thread assembles them into size-capped batches,
//! highest priority first, and hands each batch to a [`BatchConsumer`].
//! Between deliveries the worker waits a hold-off interpolated linearly
//! from the batch size, so a busy batcher paces itself down.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Producers                          │
//! │        push(cargo, prio)   /   push_many(cargo, prio)    │
//! └───────────┬───────────────────┬───────────────┬─────────┘
//!             │                   │               │
//!      ┌──────▼─────┐      ┌──────▼─────┐  ┌──────▼─────┐
//!      │ queue[HIGH]│      │ queue[MID] │  │ queue[LOW] │  ← one lock each
//!      └──────┬─────┘      └──────┬─────┘  └──────┬─────┘
//!             └───────────────────┼───────────────┘
//!                          ┌──────▼─────┐
//!                          │   worker   │  ← wake signal, batch cap,
//!                          │   thread   │    hold-off between batches
//!                          └──────┬─────┘
//!                          ┌──────▼─────┐
//!                          │  consumer  │  ← process(&mut batch)
//!                          └────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **FIFO per priority**: items of one priority are delivered in push
//!   order; queues are never reordered.
//! - **Strict precedence**: within a batch, high items precede mid items
//!   precede low items. There is no fairness; a saturated high queue
//!   starves the others indefinitely.
//! - **Size cap**: with `max_batch > 0` no delivered batch exceeds it, and
//!   the worker re-wakes itself while residue remains.
//! - **Lock discipline**: producers at different priorities never share a
//!   lock, and the consumer is always called with no locks held.

mod config;
mod metrics;
mod priority;
mod queue;
mod wake;
mod worker;

pub use config::BatcherConfig;
pub use metrics::{BatcherMetrics, MetricsSnapshot};
pub use priority::Priority;
pub use queue::PriorityQueueSet;
pub use worker::{BatchConsumer, Batcher, SleepFn};
