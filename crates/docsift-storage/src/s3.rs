use crate::traits::{ObjectMetadata, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// S3 storage implementation
///
/// `object_store` binds a client to one bucket, so one client is built lazily
/// per bucket and cached.
pub struct S3Storage {
    stores: RwLock<HashMap<String, Arc<AmazonS3>>>,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:4566" for LocalStack, "http://localhost:9000" for MinIO)
    pub fn new(region: String, endpoint_url: Option<String>) -> Self {
        S3Storage {
            stores: RwLock::new(HashMap::new()),
            region,
            endpoint_url,
        }
    }

    fn build_store(&self, bucket: &str) -> StorageResult<AmazonS3> {
        // Build AmazonS3 object store from environment and explicit settings.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(self.region.clone())
            .with_bucket_name(bucket.to_string());

        if let Some(ref endpoint) = self.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))
    }

    async fn store(&self, bucket: &str) -> StorageResult<Arc<AmazonS3>> {
        if let Some(store) = self.stores.read().await.get(bucket) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }
        let store = Arc::new(self.build_store(bucket)?);
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    fn generate_url(bucket: &str, key: &str) -> String {
        format!("s3://{}/{}", bucket, key)
    }

    fn map_get_error(bucket: &str, key: &str, e: ObjectStoreError) -> StorageError {
        match e {
            ObjectStoreError::NotFound { .. } => {
                StorageError::NotFound(Self::generate_url(bucket, key))
            }
            other => StorageError::DownloadFailed(other.to_string()),
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn download(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let start = std::time::Instant::now();
        let store = self.store(bucket).await?;
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = store.get(&location).await;
        let result = result.map_err(|e| Self::map_get_error(bucket, key, e))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::debug!(
            bucket = %bucket,
            key = %key,
            size_bytes = bytes.len() as u64,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(bytes.to_vec())
    }

    async fn download_to(&self, bucket: &str, key: &str, dest: &FsPath) -> StorageResult<u64> {
        let start = std::time::Instant::now();
        let store = self.store(bucket).await?;
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = store.get(&location).await;
        let result = result.map_err(|e| {
            let err = Self::map_get_error(bucket, key, e);
            if !err.is_not_found() {
                tracing::error!(
                    error = %err,
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
            }
            err
        })?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = result.into_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(written)
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> StorageResult<String> {
        let size = data.len() as u64;
        let store = self.store(bucket).await?;
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        for (name, value) in metadata {
            attributes.insert(
                Attribute::Metadata(Cow::Owned(name.clone())),
                AttributeValue::from(value.clone()),
            );
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = store
            .put_opts(&location, PutPayload::from(Bytes::from(data)), options)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(Self::generate_url(bucket, key))
    }

    async fn content_length(&self, bucket: &str, key: &str) -> StorageResult<u64> {
        let store = self.store(bucket).await?;
        let location = Path::from(key.to_string());

        match store.head(&location).await {
            Ok(meta) => Ok(meta.size as u64),
            Err(e) => Err(Self::map_get_error(bucket, key, e)),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let store = self.store(bucket).await?;
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = store.delete(&location).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %bucket,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 delete failed"
            );
            StorageError::DeleteFailed(e.to_string())
        })?;

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
