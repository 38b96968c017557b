//! Per-file metadata extraction.
//!
//! Each step opens (and closes) its own file handle: a `stat` for the record,
//! the image header and EXIF block for photos, and an `ffprobe` child process
//! for videos.

mod photo;
mod video;

use crate::MediaKind;
use crate::error::{ErrorKind, Result};
use crate::models::{MediaMetadata, MediaRecord, PhotoMetadata, VideoMetadata};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;

/// How long `ffprobe` may run before it is killed.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns a media file into a [`MediaRecord`].
#[derive(Debug, Clone)]
pub struct Extractor {
    ffprobe: Option<PathBuf>,
    probe_timeout: Duration,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            ffprobe: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl Extractor {
    /// An extractor that looks for `ffprobe` on `PATH` when probing videos.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this `ffprobe` executable instead of searching `PATH`.
    pub fn with_ffprobe(mut self, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffprobe = Some(ffprobe.into());
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Extract a full record for `path`, which has already been classified
    /// as `kind`.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn extract(&self, path: &Path, kind: MediaKind) -> Result<MediaRecord> {
        let stat = std::fs::metadata(path).map_err(|e| ErrorKind::io(e, path))?;
        let modified = stat.modified().map_err(|e| ErrorKind::io(e, path))?;
        let metadata = match kind {
            MediaKind::Photo => MediaMetadata::Photo(self.extract_photo(path)?),
            MediaKind::Video => MediaMetadata::Video(self.extract_video(path)?),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(MediaRecord {
            name,
            path: path.to_path_buf(),
            size: stat.len(),
            modified: OffsetDateTime::from(modified),
            created: stat.created().ok().map(OffsetDateTime::from),
            metadata,
        })
    }

    /// Photo dimensions and EXIF metadata.
    pub fn extract_photo(&self, path: &Path) -> Result<PhotoMetadata> {
        photo::extract(path)
    }

    /// Video metadata from `ffprobe`.
    pub fn extract_video(&self, path: &Path) -> Result<VideoMetadata> {
        let ffprobe = match &self.ffprobe {
            Some(ffprobe) => ffprobe.clone(),
            None => video::discover()?,
        };
        video::extract(&ffprobe, path, self.probe_timeout)
    }
}

#[cfg(test)]
pub(crate) use self::photo::tests as photo_fixtures;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::photo_fixtures::{field, jpeg_with_exif, ratio};
    use exif::{Tag, Value};

    #[test]
    fn test_extract_photo_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.jpg");
        let fields = [
            field(Tag::PhotographicSensitivity, Value::Short(vec![200])),
            field(Tag::FNumber, ratio(28, 10)),
        ];
        let bytes = jpeg_with_exif(4, 4, &fields);
        std::fs::write(&path, &bytes).unwrap();

        let record = Extractor::new().extract(&path, MediaKind::Photo).unwrap();
        assert_eq!(record.name, "a.jpg");
        assert_eq!(record.path, path);
        assert_eq!(record.size, bytes.len() as u64);
        assert_eq!(record.kind(), MediaKind::Photo);
        let MediaMetadata::Photo(photo) = record.metadata else {
            panic!("expected photo metadata");
        };
        assert_eq!(photo.iso, Some(200));
        assert_eq!(photo.aperture, Some(2.8));
    }

    #[test]
    fn test_extract_missing_file() {
        let err = Extractor::new().extract(Path::new("/nonexistent/a.jpg"), MediaKind::Photo).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_configured_prober_is_used() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();
        let extractor = Extractor::new().with_ffprobe(temp_dir.path().join("no-such-ffprobe"));
        let err = extractor.extract(&path, MediaKind::Video).unwrap_err();
        assert!(matches!(&*err, ErrorKind::ProberNotFound));
    }
}
