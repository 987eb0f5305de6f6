//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// User metadata attached to uploaded objects
pub type ObjectMetadata = HashMap<String, String>;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Missing objects never reappear on retry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// Every call names its bucket explicitly: a single worker reads notifications
/// for several buckets and writes thumbnails and evacuated work to configurable
/// destinations. Implementations must be safe for concurrent independent calls.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Download an object into memory
    async fn download(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    /// Download an object into `dest`, returning the number of bytes written.
    ///
    /// `dest` is created or truncated. Backends that can stream override this.
    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<u64> {
        let data = self.download(bucket, key).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(data.len() as u64)
    }

    /// Upload bytes under `bucket`/`key` and return the object URL (`s3://bucket/key` for S3)
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StorageResult<String>;

    /// Size in bytes of an object, or `NotFound`
    async fn content_length(&self, bucket: &str, key: &str) -> StorageResult<u64>;

    /// Check if an object exists
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        match self.content_length(bucket, key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete an object
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
