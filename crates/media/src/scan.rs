//! Recursive directory scanning.

use crate::MediaKind;
use crate::error::{ErrorKind, Result};
use crate::extract::Extractor;
use crate::models::{ScanResult, ScanWarning};
use std::path::Path;
use tracing::instrument;
use walkdir::WalkDir;

/// Walks a directory tree and extracts a record for every recognised media
/// file.
///
/// Entries are visited depth-first in lexical file-name order, so scanning an
/// unchanged tree twice gives the same records in the same order.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    extractor: Extractor,
}

impl Scanner {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }

    /// Scan `root`, which may be a directory or a single file.
    ///
    /// Only a root that can't be stat'ed (or, for a directory, listed) fails
    /// the whole scan. Anything that goes wrong below the root is reported
    /// as a [`ScanWarning`] and the walk carries on.
    #[instrument(skip(self, root), fields(root = %root.as_ref().display()))]
    pub fn scan(&self, root: impl AsRef<Path>) -> Result<ScanResult> {
        let root = root.as_ref();
        let stat = std::fs::metadata(root).map_err(|e| ErrorKind::io(e, root))?;
        if stat.is_dir() {
            std::fs::read_dir(root).map_err(|e| ErrorKind::io(e, root))?;
        }

        let mut result = ScanResult::default();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    let error = exn::Exn::from(e).raise(ErrorKind::Walk(path.clone()));
                    result.warnings.push(ScanWarning { path, error });
                    continue;
                },
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path();
            let Some(kind) = MediaKind::from_path(path) else {
                tracing::trace!(path = %path.display(), "Ignoring unrecognised file");
                continue;
            };
            match self.extractor.extract(path, kind) {
                Ok(record) => {
                    tracing::debug!(path = %path.display(), %kind, "Extracted metadata");
                    result.records.push(record);
                },
                Err(error) => {
                    tracing::warn!(path = %path.display(), %kind, error = %*error, "Skipping file");
                    result.warnings.push(ScanWarning {
                        path: path.to_path_buf(),
                        error,
                    });
                },
            }
        }
        tracing::info!(records = result.records.len(), warnings = result.warnings.len(), "Scan complete");
        Ok(result)
    }
}
