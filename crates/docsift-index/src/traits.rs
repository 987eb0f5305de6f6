//! Document index abstraction trait

use async_trait::async_trait;
use docsift_core::Document;
use thiserror::Error;

/// Index operation errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Index write failed: {0}")]
    WriteFailed(String),

    #[error("Index request failed: {0}")]
    RequestFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Insert or overwrite the record stored under `id`.
    async fn upsert(&self, id: &str, document: &Document) -> IndexResult<()>;

    /// Whether the index currently answers requests.
    async fn is_connected(&self) -> bool;

    /// Create the index with its field mappings. Returns `true` if it was created,
    /// `false` if it already existed.
    async fn create_index_if_missing(&self) -> IndexResult<bool>;

    fn index_name(&self) -> &str;
}
