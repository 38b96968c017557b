//! Storage configuration models.
//!
//! A [`StorageConfig`] is owned by whatever configuration service created it
//! (database row, config file entry); this crate only reads it. The raw
//! `type` tag stays a string so that an unknown tag can be reported by the
//! [dispatcher](crate::Dispatcher) rather than failing at deserialization.

use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

/// Default SSH port used when a NAS configuration doesn't specify one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// The closed set of storage backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageType {
    /// Local filesystem under `base_path`.
    Local,
    /// Remote NAS reachable over SSH/SFTP.
    Nas,
    /// S3-compatible object storage.
    ObjectStorage,
}
impl StorageType {
    /// Canonical tag for this storage type.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Local => "local",
            StorageType::Nas => "nas",
            StorageType::ObjectStorage => "object-storage",
        }
    }
}
impl Display for StorageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
impl FromStr for StorageType {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageType::Local),
            "nas" | "sftp" => Ok(StorageType::Nas),
            // "qiniu" is what older source configurations were saved with.
            "object-storage" | "object_storage" | "s3" | "qiniu" => Ok(StorageType::ObjectStorage),
            _ => exn::bail!(ErrorKind::UnsupportedType(s.to_string())),
        }
    }
}

/// How the NAS backend verifies the remote host key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum HostKeyPolicy {
    /// Verify against an OpenSSH `known_hosts` file. When no file is given,
    /// `~/.ssh/known_hosts` is used.
    Strict {
        #[serde(default)]
        known_hosts: Option<PathBuf>,
    },
    /// Accept whatever key the host presents. Vulnerable to MITM; only for
    /// trusted home networks.
    AcceptAny,
}
impl Default for HostKeyPolicy {
    fn default() -> Self {
        Self::Strict { known_hosts: None }
    }
}

/// A single storage destination and its credentials.
///
/// Only a subset of fields is relevant for each [`StorageType`]:
///
/// | type             | fields used                                                  |
/// |------------------|--------------------------------------------------------------|
/// | `local`          | `base_path` (absolute)                                       |
/// | `nas`            | `host`, `port`, `username`, `password`, `base_path`, `host_key_policy`, `timeout_secs` |
/// | `object-storage` | `bucket`, `region`, `endpoint`, `access_key`, `secret_key`, `base_path` (key prefix), `timeout_secs` |
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Display name of the configuration (used for logging only).
    pub name: String,
    /// Raw type tag, see [`StorageType`].
    #[serde(rename = "type")]
    pub kind: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services that aren't AWS.
    pub endpoint: Option<String>,
    /// Root directory (local, NAS) or key prefix (object storage). Must be
    /// absolute for the local backend.
    pub base_path: Option<String>,
    pub host_key_policy: HostKeyPolicy,
    /// Upper bound for individual network operations (SSH calls, S3 requests).
    pub timeout_secs: Option<u64>,
}
impl StorageConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Parse the raw type tag into the closed [`StorageType`] set.
    ///
    /// Returns [`UnsupportedType`](ErrorKind::UnsupportedType) naming the tag
    /// if it isn't recognised.
    pub fn storage_type(&self) -> Result<StorageType> {
        self.kind.parse()
    }

    /// Fetch a field that the selected backend can't work without.
    pub(crate) fn required<'a>(&self, field: &'static str, value: &'a Option<String>) -> Result<&'a str> {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => exn::bail!(ErrorKind::InvalidConfig(format!(
                "{} storage `{}` is missing `{field}`",
                self.kind, self.name
            ))),
        }
    }
}
