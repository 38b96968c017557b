//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Lower-level causes (I/O, SSH, S3 SDK)
//! are kept as children in the error tree; the top-level [`ErrorKind`] is what
//! callers match on.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File or directory does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Destination already exists; uploads never overwrite.
    #[display("destination already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// A component of the destination directory exists but is a file.
    #[display("destination is not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Could not reach the remote host.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Remote host rejected the supplied credentials.
    #[display("authentication failed for {_0}")]
    Authentication(#[error(not(source))] String),
    /// Remote host key could not be verified.
    #[display("host key verification failed for {_0}")]
    HostKey(#[error(not(source))] String),
    /// A remote (SFTP) operation failed.
    #[display("remote {operation} failed: {path}")]
    Remote {
        operation: &'static str,
        path: String,
    },
    /// Path contains invalid characters or escapes the base path
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// The storage configuration is missing a field required by its backend.
    #[display("invalid storage configuration: {_0}")]
    InvalidConfig(#[error(not(source))] String),
    /// The configuration's type tag is not one of the known backends.
    #[display("unsupported storage type: {_0}")]
    UnsupportedType(#[error(not(source))] String),
    /// The backend is known but was compiled out (cargo feature disabled).
    #[display("disabled storage type: {_0}")]
    DisabledType(#[error(not(source))] String),
    /// The caller stopped waiting for the upload; the transfer was abandoned.
    #[display("upload cancelled: {_0}")]
    Cancelled(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Nothing in this crate retries on its own; this is a hint for callers
    /// that want to layer their own retry policy around an upload.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::Remote { .. } | Self::BackendError(_))
    }
}
