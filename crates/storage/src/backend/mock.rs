//! In-memory storage backend for testing.

use crate::StorageBackend;
use crate::backend::UploadStream;
use crate::error::{ErrorKind, Result};
use crate::models::{StorageConfig, StorageType};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Uploads are stored in a `HashMap` behind a [`RwLock`] keyed by validated
/// destination name, so all trait methods can operate on `&self` without
/// external synchronisation. Like the real backends, it refuses to overwrite.
///
/// # Examples
///
/// Only available with the `mock` feature (or inside this crate's tests).
///
/// ```ignore
/// use memorix_storage::{StorageConfig, StorageType, backend::{MockBackend, StorageBackend}};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::new(StorageType::Nas);
/// let config = StorageConfig::new("test", "nas");
/// let data: &'static [u8] = b"bytes";
/// backend.upload(Box::new(data), "a.jpg", &config).await?;
/// assert_eq!(backend.uploaded("a.jpg").await.as_deref(), Some(&b"bytes"[..]));
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    kind: StorageType,
    storage: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl MockBackend {
    /// Create an empty mock backend that reports itself as `kind`.
    pub fn new(kind: StorageType) -> Self {
        Self {
            kind,
            storage: RwLock::new(HashMap::new()),
        }
    }

    /// Contents of a previous upload, if any.
    pub async fn uploaded(&self, file_name: &str) -> Option<Vec<u8>> {
        let path = validate_path(file_name).ok()?;
        self.storage.read().await.get(&path).cloned()
    }

    /// Number of successful uploads received.
    pub async fn upload_count(&self) -> usize {
        self.storage.read().await.len()
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::new(StorageType::Local)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn kind(&self) -> StorageType {
        self.kind
    }

    async fn upload(&self, mut stream: UploadStream, file_name: &str, _config: &StorageConfig) -> Result<u64> {
        let path = validate_path(file_name)?;
        if self.storage.read().await.contains_key(&path) {
            exn::bail!(ErrorKind::AlreadyExists(path));
        }
        let mut data = Vec::new();
        let written = stream.read_to_end(&mut data).await.map_err(ErrorKind::Io)?;
        self.storage.write().await.insert(path, data);
        Ok(written as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_inspect() {
        let backend = MockBackend::new(StorageType::ObjectStorage);
        let config = StorageConfig::new("test", "s3");
        let data: &'static [u8] = b"hello";
        assert_eq!(backend.upload(Box::new(data), "dir/a.jpg", &config).await.unwrap(), 5);
        assert_eq!(backend.uploaded("dir/a.jpg").await.unwrap(), b"hello");
        assert_eq!(backend.upload_count().await, 1);
        assert_eq!(backend.kind(), StorageType::ObjectStorage);
    }

    #[tokio::test]
    async fn test_upload_refuses_to_overwrite() {
        let backend = MockBackend::default();
        let config = StorageConfig::new("test", "local");
        let first: &'static [u8] = b"first";
        let second: &'static [u8] = b"second";
        backend.upload(Box::new(first), "a.jpg", &config).await.unwrap();
        let err = backend.upload(Box::new(second), "a.jpg", &config).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        assert_eq!(backend.uploaded("a.jpg").await.unwrap(), b"first");
    }
}
