//! Storage providers for the source and destination sides of a transfer
//!
//! Every backend is reached through the [`StorageProvider`] trait, so the
//! worker never knows whether it is reading from a mounted volume or from an
//! object store. The pair used by the worker is resolved once at startup by
//! [`ProviderPair::from_config`].

mod nfs;
mod object;

pub use nfs::NfsProvider;
pub use object::ObjectStoreProvider;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ProviderConfig, StorageConfig};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File {0} doesn't exist in the agreed folder")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Read/write/delete-prefix capability against one storage backend.
///
/// Implementations hold no per-task state and are shared by every in-flight
/// task.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Read the whole object stored under `key`.
    async fn get_file(&self, key: &str) -> Result<Bytes>;

    /// Write `data` under `key`, creating parent folders and replacing any
    /// existing content.
    async fn post_file(&self, key: &str, data: Bytes) -> Result<()>;

    /// Remove everything under `prefix`. Nothing to delete is not an error.
    async fn delete_folder(&self, prefix: &str) -> Result<()>;

    /// Backend name for logging.
    fn kind(&self) -> &'static str;
}

/// Source and destination providers injected into the worker.
#[derive(Clone)]
pub struct ProviderPair {
    pub source: Arc<dyn StorageProvider>,
    pub destination: Arc<dyn StorageProvider>,
}

impl ProviderPair {
    pub fn new(source: Arc<dyn StorageProvider>, destination: Arc<dyn StorageProvider>) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Build both sides from the storage section of the configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let source = build_provider(&config.source)?;
        let destination = build_provider(&config.destination)?;

        tracing::info!(
            source = source.kind(),
            destination = destination.kind(),
            "Storage providers resolved"
        );

        Ok(Self::new(source, destination))
    }
}

/// Resolve a single provider from its tagged configuration
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn StorageProvider>> {
    match config {
        ProviderConfig::Nfs(nfs) => Ok(Arc::new(NfsProvider::new(&nfs.pv_path))),
        ProviderConfig::S3(s3) => Ok(Arc::new(ObjectStoreProvider::s3(s3)?)),
    }
}

/// Reject prefixes that would address the whole backend
pub(crate) fn ensure_prefix(prefix: &str) -> Result<&str> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StorageError::InvalidKey(format!(
            "refusing to delete with empty prefix '{}'",
            prefix
        )));
    }
    Ok(trimmed)
}
