//! Layered configuration for memorix.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. `config.toml` in the platform configuration directory
//!    (e.g. `~/.config/memorix/config.toml`),
//! 3. an explicitly requested file (TOML, YAML or JSON, by extension),
//! 4. `MEMORIX_`-prefixed environment variables, with `__` separating nested
//!    keys (`MEMORIX_STORAGE__NAS__HOST=nas.local`).
//!
//! ```toml
//! [scan]
//! ffprobe = "/usr/local/bin/ffprobe"
//! probe_timeout_secs = 10
//!
//! [storage.nas]
//! type = "nas"
//! host = "nas.local"
//! username = "photos"
//! password = "hunter2"
//! base_path = "/volume1/photos"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use memorix_storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "MEMORIX_";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    /// Named upload targets.
    pub storage: BTreeMap<String, StorageConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Explicit `ffprobe` executable; searched on `PATH` when unset.
    pub ffprobe: Option<PathBuf>,
    pub probe_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ffprobe: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

impl ScanConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Config {
    /// Location of the per-user configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "memorix").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from every source, with `explicit` layered over the
    /// per-user file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(Self::default_path().as_deref(), explicit)
    }

    /// Like [`load`](Self::load) with the per-user file location supplied.
    pub fn load_from(user: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(user) = user {
            tracing::debug!(path = %user.display(), "Merging user configuration (if present)");
            figment = figment.merge(Toml::file(user));
        }
        if let Some(explicit) = explicit {
            if !explicit.is_file() {
                exn::bail!(ErrorKind::NotFound(explicit.to_path_buf()));
            }
            tracing::debug!(path = %explicit.display(), "Merging configuration file");
            figment = match explicit.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
                Some("toml") => figment.merge(Toml::file(explicit)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(explicit)),
                Some("json") => figment.merge(Json::file(explicit)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(explicit.to_path_buf())),
            };
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        for (name, target) in &mut config.storage {
            if target.name.is_empty() {
                target.name = name.clone();
            }
        }
        Ok(config)
    }

    /// Look up a storage target by name.
    pub fn storage(&self, name: &str) -> Result<&StorageConfig> {
        self.storage.get(name).ok_or_raise(|| ErrorKind::UnknownTarget(name.to_string()))
    }
}
