//! In-memory storage backend.
//!
//! Used for dry runs and by tests across the workspace. Faults can be injected
//! per instance: failing downloads, artificial download latency, and uploads that
//! fail or never complete for a given key prefix.

use crate::traits::{ObjectMetadata, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub metadata: ObjectMetadata,
}

#[derive(Debug, Default)]
struct Faults {
    fail_downloads: bool,
    download_delay: Option<Duration>,
    fail_upload_prefixes: Vec<String>,
    hang_upload_prefixes: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<(String, String), StoredObject>>>,
    faults: Arc<Mutex<Faults>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing fault injection.
    pub fn put_object(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.into(),
                content_type: "application/octet-stream".to_string(),
                metadata: ObjectMetadata::new(),
            },
        );
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        lock(&self.objects)
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Sorted keys stored in `bucket`.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.objects)
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn set_fail_downloads(&self, fail: bool) {
        lock(&self.faults).fail_downloads = fail;
    }

    pub fn set_download_delay(&self, delay: Duration) {
        lock(&self.faults).download_delay = Some(delay);
    }

    pub fn fail_uploads_with_prefix(&self, prefix: &str) {
        lock(&self.faults)
            .fail_upload_prefixes
            .push(prefix.to_string());
    }

    /// Uploads under `prefix` never complete; callers must bound them with a timeout.
    pub fn hang_uploads_with_prefix(&self, prefix: &str) {
        lock(&self.faults)
            .hang_upload_prefixes
            .push(prefix.to_string());
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn download(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let (fail, delay) = {
            let faults = lock(&self.faults);
            (faults.fail_downloads, faults.download_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(StorageError::DownloadFailed(
                "injected download failure".to_string(),
            ));
        }
        self.get_object(bucket, key)
            .map(|object| object.data)
            .ok_or_else(|| StorageError::NotFound(format!("s3://{}/{}", bucket, key)))
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StorageResult<String> {
        let (fail, hang) = {
            let faults = lock(&self.faults);
            (
                faults.fail_upload_prefixes.iter().any(|p| key.starts_with(p)),
                faults.hang_upload_prefixes.iter().any(|p| key.starts_with(p)),
            )
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(StorageError::UploadFailed(format!(
                "injected upload failure for {}",
                key
            )));
        }

        lock(&self.objects).insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
            },
        );
        Ok(format!("s3://{}/{}", bucket, key))
    }

    async fn content_length(&self, bucket: &str, key: &str) -> StorageResult<u64> {
        self.get_object(bucket, key)
            .map(|object| object.data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(format!("s3://{}/{}", bucket, key)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        lock(&self.objects).remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
