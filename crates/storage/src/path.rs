//! Path validation and normalisation.
//!
//! Destination names handed to [`upload`](crate::StorageBackend::upload) come
//! from outside (an HTTP multipart field, a CLI argument), so they are
//! validated before being joined to a backend's base path. Remote (SFTP) paths
//! additionally get normalised to forward-slash form regardless of the host
//! OS conventions.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Validates a destination name for security and correctness.
/// Ensures that names don't escape the base path (no `..` traversal).
///
/// # Returns
/// Returns the normalized relative path if valid, or
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath) if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use memorix_storage::validate_path;
/// // Valid names
/// assert!(validate_path("IMG_0001.jpg").is_ok());
/// assert!(validate_path("2024/06/IMG_0001.jpg").is_ok());
/// assert!(validate_path("a/../IMG_0001.jpg").is_ok()); // (never leaves base path)
/// // Invalid names
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Names get resolved
/// assert_eq!(
///     validate_path("wrong/../2024/./IMG_0001.jpg").unwrap(),
///     Path::new("2024/IMG_0001.jpg")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls (libssh2 included).
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Normalise a remote path to forward-slash form.
///
/// Backslashes become slashes, repeated slashes collapse, `.` segments and
/// trailing slashes are dropped. A leading slash (absolute remote path) is
/// preserved; an empty input becomes `"."` (the SFTP login directory).
///
/// ```
/// use memorix_storage::normalize_remote_path;
/// assert_eq!(normalize_remote_path(r"\volume1\photos\"), "/volume1/photos");
/// assert_eq!(normalize_remote_path("photos//2024/./june"), "photos/2024/june");
/// assert_eq!(normalize_remote_path("/"), "/");
/// ```
pub fn normalize_remote(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let segments: Vec<&str> = unified.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    match (absolute, segments.is_empty()) {
        (true, true) => "/".to_string(),
        (false, true) => ".".to_string(),
        (true, false) => format!("/{}", segments.join("/")),
        (false, false) => segments.join("/"),
    }
}

/// Join an already-[validated](validate) relative path onto a normalised
/// remote directory, always using `/` as the separator.
pub(crate) fn remote_join(dir: &str, relative: &Path) -> String {
    let tail = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    match dir {
        "." => tail,
        "/" => format!("/{tail}"),
        dir => format!("{dir}/{tail}"),
    }
}

/// Parent directory of a remote path produced by [`remote_join`].
pub(crate) fn remote_parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => ".",
    }
}
