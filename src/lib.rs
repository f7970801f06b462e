//! Priority-aware request queue batching.
//!
//! `reqbatch` is an in-process building block for clients that talk to a
//! slow or rate-sensitive service: producers push individually owned
//! requests tagged with a coarse [`Priority`], and a dedicated worker
//! thread collects them into size-capped batches, delivers each batch to a
//! [`BatchConsumer`], and paces deliveries with a hold-off interpolated
//! from the batch size.
//!
//! The crate also ships [`addr::split`], a small splitter for the escaped
//! element paths such clients use to address items.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use reqbatch::{BatchConsumer, Batcher, BatcherConfig, Priority};
//!
//! struct Printer;
//!
//! impl BatchConsumer<String> for Printer {
//!     fn process(&self, batch: &mut Vec<Arc<String>>) {
//!         for request in batch.iter() {
//!             println!("sending {request}");
//!         }
//!     }
//! }
//!
//! # fn main() -> Result<(), reqbatch::BatcherError> {
//! let batcher = Batcher::new("sender", Arc::new(Printer), BatcherConfig::default())?;
//! batcher.push(Arc::new("status poll".to_string()), Priority::Low);
//! batcher.push(Arc::new("setpoint write".to_string()), Priority::High);
//! # Ok(())
//! # }
//! ```

pub mod addr;
pub mod batcher;
pub mod error;

pub use batcher::{
    BatchConsumer, Batcher, BatcherConfig, BatcherMetrics, MetricsSnapshot, Priority,
    PriorityQueueSet, SleepFn,
};
pub use error::BatcherError;
