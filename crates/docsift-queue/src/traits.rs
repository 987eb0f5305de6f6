//! Message queue abstraction trait

use async_trait::async_trait;
use docsift_core::QueueMessage;
use thiserror::Error;

/// Queue operation errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Change visibility failed: {0}")]
    VisibilityFailed(String),

    #[error("Receipt handle is no longer valid: {0}")]
    InvalidReceipt(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// A single work queue with at-least-once delivery.
///
/// Implementations must be safe for concurrent independent calls.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Long-poll for up to `max_messages`, waiting at most `wait_seconds`.
    ///
    /// Received messages stay hidden for `visibility_timeout` seconds. An empty
    /// batch is the normal idle result, not an error.
    async fn receive_batch(
        &self,
        max_messages: i32,
        wait_seconds: i32,
        visibility_timeout: i32,
    ) -> QueueResult<Vec<QueueMessage>>;

    /// Irrecoverably consume a delivery.
    async fn delete_message(&self, receipt_handle: &str) -> QueueResult<()>;

    /// Reset the visibility timeout of a delivery to `timeout_seconds` from now.
    ///
    /// `0` makes the message visible to other consumers immediately.
    async fn extend_visibility(&self, receipt_handle: &str, timeout_seconds: i32)
        -> QueueResult<()>;

    /// URL or name identifying the queue, for logging.
    fn queue_url(&self) -> &str;
}
