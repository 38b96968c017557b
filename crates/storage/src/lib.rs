//! Upload byte streams to one of several storage destinations.
//!
//! Each destination kind implements [`StorageBackend`]; the [`Dispatcher`]
//! picks one per call from the [`StorageConfig`]'s type tag.

pub mod backend;
mod dispatch;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::dispatch::Dispatcher;
pub use crate::models::{DEFAULT_SSH_PORT, HostKeyPolicy, StorageConfig, StorageType};
pub use crate::path::normalize_remote as normalize_remote_path;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
