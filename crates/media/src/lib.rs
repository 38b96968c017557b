//! Walk a media library and extract structured photo and video metadata.
//!
//! The [`Scanner`] classifies files by extension and hands each recognised
//! file to the [`Extractor`]. A file that can't be processed becomes a
//! [`ScanWarning`]; it never aborts the scan.

pub mod error;
mod extract;
mod ingest;
mod kind;
mod models;
mod scan;

pub use crate::extract::{DEFAULT_PROBE_TIMEOUT, Extractor};
pub use crate::ingest::{IngestReport, RecordStore, SaveFailure, ingest};
pub use crate::kind::MediaKind;
pub use crate::models::{
    GeoLocation, MediaMetadata, MediaRecord, PhotoMetadata, ScanResult, ScanWarning, VideoMetadata,
};
pub use crate::scan::Scanner;
