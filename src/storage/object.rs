//! Object storage provider built on the Apache Arrow `object_store` crate

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::{ObjectStore, PutPayload, RetryConfig, path::Path as StoragePath};
use std::sync::Arc;

use super::{Result, StorageError, StorageProvider, ensure_prefix};
use crate::config::S3Config;

/// Provider wrapping any `object_store` backend
#[derive(Clone)]
pub struct ObjectStoreProvider {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

impl ObjectStoreProvider {
    /// Create new provider with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            bucket: "filesyncer-local".to_string(),
        }
    }

    /// Build an S3-compatible store from configuration
    pub fn s3(config: &S3Config) -> Result<Self> {
        let retry = RetryConfig {
            max_retries: config.max_attempts,
            ..RetryConfig::default()
        };

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_virtual_hosted_style_request(!config.force_path_style)
            .with_retry(retry);

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;

        Ok(Self::new(Arc::new(store), config.bucket.clone()))
    }
}

#[async_trait]
impl StorageProvider for ObjectStoreProvider {
    async fn get_file(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => {
                tracing::error!(key, bucket = %self.bucket, error = %e, "Failed to read object");
                return Err(e.into());
            }
        };

        let bytes = result.bytes().await?;
        tracing::debug!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    async fn post_file(&self, key: &str, data: Bytes) -> Result<()> {
        let path = StoragePath::from(key);
        let size = data.len();

        self.store.put(&path, PutPayload::from(data)).await.map_err(|e| {
            tracing::error!(key, bucket = %self.bucket, error = %e, "Failed to write object");
            StorageError::from(e)
        })?;

        tracing::debug!(key, size, "Uploaded to storage");
        Ok(())
    }

    async fn delete_folder(&self, prefix: &str) -> Result<()> {
        let prefix = StoragePath::from(ensure_prefix(prefix)?);

        // The listing stream walks every result page; delete_stream batches
        // the removals into bulk requests where the backend supports them.
        let locations = self
            .store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .boxed();

        let deleted: Vec<StoragePath> = self
            .store
            .delete_stream(locations)
            .try_collect()
            .await?;

        tracing::info!(prefix = %prefix, bucket = %self.bucket, deleted = deleted.len(), "Deleted folder");
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "s3"
    }
}
