//! Media Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Any error returned for a single file
//! is turned into a scan warning by the caller; only errors on the scan root
//! abort a scan.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A media error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The image header could not be decoded.
    #[display("not a decodable image: {}", _0.display())]
    InvalidImage(#[error(not(source))] PathBuf),
    /// No `ffprobe` executable was configured or found on `PATH`.
    #[display("ffprobe executable not found")]
    ProberNotFound,
    /// `ffprobe` ran but reported failure.
    #[display("probe failed for {}", _0.display())]
    ProbeFailed(#[error(not(source))] PathBuf),
    /// `ffprobe` did not finish within the configured timeout.
    #[display("probe timed out after {}ms", _0.as_millis())]
    ProbeTimeout(#[error(not(source))] Duration),
    #[display("invalid probe output: {_0}")]
    InvalidProbeOutput(#[error(not(source))] String),
    /// A record store rejected a record.
    #[display("could not save record for {}", _0.display())]
    Store(#[error(not(source))] PathBuf),
    /// A directory could not be read during a walk.
    #[display("could not read directory entry: {}", _0.display())]
    Walk(#[error(not(source))] PathBuf),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Categorise an I/O error raised while touching `path`.
    pub(crate) fn io(err: IoError, path: &Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ProbeTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_categories() {
        let path = Path::new("/photos/a.jpg");
        let kind = ErrorKind::io(IoError::from(std::io::ErrorKind::NotFound), path);
        assert!(matches!(kind, ErrorKind::NotFound(ref p) if p == path));
        let kind = ErrorKind::io(IoError::from(std::io::ErrorKind::PermissionDenied), path);
        assert!(matches!(kind, ErrorKind::PermissionDenied(_)));
        let kind = ErrorKind::io(IoError::from(std::io::ErrorKind::UnexpectedEof), path);
        assert!(matches!(kind, ErrorKind::Io(_)));
        assert!(kind.is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::ProbeTimeout(Duration::from_secs(5)).to_string(), "probe timed out after 5000ms");
        assert_eq!(
            ErrorKind::InvalidImage(PathBuf::from("c.jpg")).to_string(),
            "not a decodable image: c.jpg"
        );
        assert!(!ErrorKind::ProberNotFound.is_retryable());
    }
}
