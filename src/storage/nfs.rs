//! Mounted-volume provider

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::{Result, StorageError, StorageProvider, ensure_prefix};

/// Provider rooted at a persistent-volume path
#[derive(Debug, Clone)]
pub struct NfsProvider {
    root: PathBuf,
}

impl NfsProvider {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a relative key onto the root, refusing anything that escapes it
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(StorageError::InvalidKey(key.to_string())),
            }
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageProvider for NfsProvider {
    async fn get_file(&self, key: &str) -> Result<Bytes> {
        let full_path = self.resolve(key)?;
        tracing::debug!(path = %full_path.display(), "Starting getFile");

        match fs::read(&full_path).await {
            Ok(data) => {
                tracing::debug!(key, size = data.len(), "Done getFile");
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(source) => Err(StorageError::Io {
                path: full_path.display().to_string(),
                source,
            }),
        }
    }

    async fn post_file(&self, key: &str, data: Bytes) -> Result<()> {
        let full_path = self.resolve(key)?;
        tracing::debug!(path = %full_path.display(), size = data.len(), "Starting postFile");

        let io_err = |source| StorageError::Io {
            path: full_path.display().to_string(),
            source,
        };

        if let Some(dir) = full_path.parent() {
            fs::create_dir_all(dir).await.map_err(io_err)?;
        }
        fs::write(&full_path, &data).await.map_err(io_err)?;

        tracing::debug!(path = %full_path.display(), "Done postFile");
        Ok(())
    }

    async fn delete_folder(&self, prefix: &str) -> Result<()> {
        let prefix = ensure_prefix(prefix)?;
        let full_path = self.resolve(prefix)?;

        match fs::remove_dir_all(&full_path).await {
            Ok(()) => {
                tracing::info!(path = %full_path.display(), "Deleted folder");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %full_path.display(), "Folder doesn't exist, nothing to delete");
                Ok(())
            }
            Err(source) => Err(StorageError::Io {
                path: full_path.display().to_string(),
                source,
            }),
        }
    }

    fn kind(&self) -> &'static str {
        "nfs"
    }
}
