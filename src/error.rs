//! Error types for the batcher library.
//!
//! The batching cycle itself has no recoverable error states: delivery
//! outcomes belong to the consumer (there is no retry policy and no
//! dead-letter queue). Errors only exist at the lifecycle and type
//! boundaries below.

use thiserror::Error;

/// Errors surfaced by batcher construction and lifecycle operations.
#[derive(Error, Debug)]
pub enum BatcherError {
    /// The worker thread could not be spawned.
    #[error("failed to spawn batcher worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// `start()` was called while the worker is already running.
    #[error("batcher '{0}' is already running")]
    AlreadyRunning(String),

    /// A numeric priority outside the supported range was supplied.
    #[error("invalid priority value {0} (expected 0..=2)")]
    InvalidPriority(u8),
}
