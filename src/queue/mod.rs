//! Queue Service adapter.
//!
//! Named FIFO queues carrying [`Message`] envelopes. Every component pushes
//! to exactly one named queue per emitted message and block-pops from its
//! own queue with a timeout.
//!
//! # Delivery
//!
//! Delivery is **at-most-once**: `pop` removes the message before the
//! consumer processes it. There is no acknowledgment, visibility timeout or
//! dead-letter queue, so a consumer that dies mid-message loses it and the
//! story it referenced stalls at its last persisted status.

pub mod memory;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Message;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

/// Delivery guarantee offered by a queue backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A popped message is gone; failures after `pop` lose it
    AtMostOnce,
}

/// Errors raised by queue backends
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue worker task failed: {0}")]
    Task(String),

    #[error("Queue lock poisoned")]
    Poisoned,
}

/// Blocking push/pop against named queues
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a message to the tail of `queue`
    async fn push(&self, queue: &str, message: &Message) -> Result<(), QueueError>;

    /// Remove the oldest message from `queue`, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing to deliver.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<Message>, QueueError>;

    /// Number of messages currently waiting in `queue`
    async fn len(&self, queue: &str) -> Result<usize, QueueError>;

    /// Delivery guarantee of this backend
    fn delivery(&self) -> Delivery {
        Delivery::AtMostOnce
    }
}
