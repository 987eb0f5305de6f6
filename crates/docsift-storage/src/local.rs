use crate::keys::validate_key;
use crate::traits::{ObjectMetadata, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage implementation
///
/// Objects live at `{base_path}/{bucket}/{key}`. Useful for running the worker
/// against a directory tree instead of S3.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance rooted at `base_path`
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    /// Convert bucket and key to a filesystem path with traversal checks
    fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        validate_key(bucket)?;
        if bucket.contains('/') {
            return Err(StorageError::InvalidKey(format!(
                "Bucket name contains '/': {}",
                bucket
            )));
        }
        validate_key(key)?;
        Ok(self.base_path.join(bucket).join(key))
    }

    fn generate_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    fn map_read_error(path: &Path, e: std::io::Error) -> StorageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path.display().to_string())
        } else {
            StorageError::DownloadFailed(e.to_string())
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn download(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        fs::read(&path)
            .await
            .map_err(|e| Self::map_read_error(&path, e))
    }

    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> StorageResult<u64> {
        let path = self.object_path(bucket, key)?;
        fs::copy(&path, dest)
            .await
            .map_err(|e| Self::map_read_error(&path, e))
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
        _metadata: &ObjectMetadata,
    ) -> StorageResult<String> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Local upload successful");
        Ok(Self::generate_url(&path))
    }

    async fn content_length(&self, bucket: &str, key: &str) -> StorageResult<u64> {
        let path = self.object_path(bucket, key)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| Self::map_read_error(&path, e))?;
        Ok(meta.len())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_download_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let url = storage
            .upload("docs", "a/b.txt", b"hello".to_vec(), "text/plain", &ObjectMetadata::new())
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert_eq!(storage.content_length("docs", "a/b.txt").await.unwrap(), 5);

        let dest = dir.path().join("copy.txt");
        let written = storage.download_to("docs", "a/b.txt", &dest).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");

        storage.delete("docs", "a/b.txt").await.unwrap();
        assert!(!storage.exists("docs", "a/b.txt").await.unwrap());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let err = storage.download("docs", "nope.pdf").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let err = storage.download("docs", "../secret").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        let err = storage.download("../docs", "x").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
