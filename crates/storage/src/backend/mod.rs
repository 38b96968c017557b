//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, the single capability every
//! destination provides: consume a byte stream and persist it under a name.
//!

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod nas;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
pub use self::nas::{NasBackend, RemoteFs, RemoteKind};
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::StorageType;
use crate::error::Result;
use crate::models::StorageConfig;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Readable byte source handed to [`StorageBackend::upload`].
///
/// `'static` so that backends with blocking transports can move it into
/// [`spawn_blocking`](tokio::task::spawn_blocking).
pub type UploadStream = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// Unified interface for storage backends.
///
/// # Contract
/// - The stream is consumed to the end, and its bytes are written to a
///   backend-defined location derived from `config` and `file_name`.
/// - `file_name` is relative and gets validated with
///   [`validate_path`](crate::validate_path); nested names create their
///   intermediate directories.
/// - Exactly one attempt is made. There is **no atomicity**: a failure part
///   way through the copy may leave a partial file at the destination.
///
/// # Examples
///
/// ```no_run
/// use memorix_storage::{StorageConfig, backend::{LocalBackend, StorageBackend}, error::Result};
///
/// async fn save(bytes: &'static [u8]) -> Result<u64> {
///     let config = StorageConfig::new("disk", "local").with_base_path("/srv/photos");
///     LocalBackend.upload(Box::new(bytes), "2024/IMG_0001.jpg", &config).await
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// The storage type this backend serves.
    fn kind(&self) -> StorageType;

    /// Copy `stream` to the destination described by `config` and
    /// `file_name`, returning the number of bytes written.
    async fn upload(&self, stream: UploadStream, file_name: &str, config: &StorageConfig) -> Result<u64>;
}
