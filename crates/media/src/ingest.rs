//! Scan a tree and hand every record to a persistence layer.

use crate::error::Result;
use crate::models::{MediaRecord, ScanWarning};
use crate::scan::Scanner;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Where ingested records end up.
///
/// Implementations report their own failures as
/// [`ErrorKind::Store`](crate::error::ErrorKind::Store).
pub trait RecordStore {
    fn save(&mut self, record: &MediaRecord) -> Result<()>;
}

impl RecordStore for Vec<MediaRecord> {
    fn save(&mut self, record: &MediaRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// A record the store refused.
#[derive(Debug)]
pub struct SaveFailure {
    pub path: PathBuf,
    pub error: crate::error::Error,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    /// Records the store accepted.
    pub saved: usize,
    pub failures: Vec<SaveFailure>,
    /// Files the scan skipped.
    pub warnings: Vec<ScanWarning>,
}

/// Scan `root` and save each record to `store`.
///
/// A record that fails to save is logged and collected; the rest of the batch
/// is still saved. Only a fatal scan error aborts.
#[instrument(skip(scanner, root, store), fields(root = %root.as_ref().display()))]
pub fn ingest(scanner: &Scanner, root: impl AsRef<Path>, store: &mut dyn RecordStore) -> Result<IngestReport> {
    let result = scanner.scan(root)?;
    let mut report = IngestReport {
        warnings: result.warnings,
        ..Default::default()
    };
    for record in &result.records {
        match store.save(record) {
            Ok(()) => report.saved += 1,
            Err(error) => {
                tracing::warn!(path = %record.path.display(), error = %*error, "Failed to save record");
                report.failures.push(SaveFailure {
                    path: record.path.clone(),
                    error,
                });
            },
        }
    }
    tracing::info!(saved = report.saved, failed = report.failures.len(), "Ingest complete");
    Ok(report)
}
