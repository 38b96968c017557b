//! Local filesystem storage backend.
//!
//! Files are written under the configuration's `base_path` using `tokio::fs`
//! for async I/O.

use crate::backend::{StorageBackend, UploadStream};
use crate::error::{ErrorKind, Result};
use crate::models::{StorageConfig, StorageType};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{self, AsyncWriteExt};
use tracing::instrument;

/// Local filesystem storage backend.
///
/// Stateless: the destination directory comes from each call's
/// [`StorageConfig::base_path`], which must be absolute.
///
/// # Examples
///
/// ```no_run
/// use memorix_storage::{StorageConfig, backend::{LocalBackend, StorageBackend}};
/// use memorix_storage::error::{ErrorKind, Result};
///
/// # async fn example() -> Result<()> {
/// let config = StorageConfig::new("disk", "local").with_base_path("/srv/photos");
/// let file = tokio::fs::File::open("/tmp/IMG_0001.jpg").await.map_err(ErrorKind::Io)?;
/// LocalBackend.upload(Box::new(file), "IMG_0001.jpg", &config).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
    /// Resolve the absolute destination for `file_name` under the configured
    /// base path.
    fn destination(config: &StorageConfig, file_name: &str) -> Result<PathBuf> {
        let root = PathBuf::from(config.required("base_path", &config.base_path)?);
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        let validated = validate_path(file_name)?;
        Ok(root.join(validated))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_path_buf()),
            std::io::ErrorKind::NotADirectory => ErrorKind::NotADirectory(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> StorageType {
        StorageType::Local
    }

    #[instrument(skip(self, stream, config), fields(storage = %config.name))]
    async fn upload(&self, mut stream: UploadStream, file_name: &str, config: &StorageConfig) -> Result<u64> {
        let destination = Self::destination(config, file_name)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, parent))?;
        }
        // Never overwrite: same semantics as the NAS backend.
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&destination)
            .await
            .map_err(|e| Self::map_io_error(e, &destination))?;
        let written = io::copy(&mut stream, &mut file).await.map_err(ErrorKind::Io)?;
        file.flush().await.map_err(ErrorKind::Io)?;
        tracing::debug!(path = %destination.display(), bytes = written, "Stored upload on local disk");
        Ok(written)
    }
}
