use crate::MediaKind;
use crate::error::ErrorKind;
use exn::Exn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;

/// One ingested media file: filesystem facts plus extracted metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Display name (the file name).
    pub name: String,
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    /// Only present where the platform reports a creation time.
    #[serde(with = "time::serde::rfc3339::option", default, skip_serializing_if = "Option::is_none")]
    pub created: Option<OffsetDateTime>,
    pub metadata: MediaMetadata,
}

impl MediaRecord {
    pub fn kind(&self) -> MediaKind {
        match self.metadata {
            MediaMetadata::Photo(_) => MediaKind::Photo,
            MediaMetadata::Video(_) => MediaKind::Video,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaMetadata {
    Photo(PhotoMetadata),
    Video(VideoMetadata),
}

/// Photo metadata. Every field is optional: a tag that is missing or cannot
/// be decoded simply stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoMetadata {
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    /// Exposure time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<f64>,
    /// F-number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
    /// Focal length in millimetres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flash_fired: Option<bool>,
    /// EXIF orientation code (1-8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u32>,
    /// EXIF exposure program code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_program: Option<u32>,
    /// EXIF white balance code (0 auto, 1 manual).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_balance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Decimal degrees; south and west are negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Video metadata as reported by `ffprobe` for the first video stream (and
/// the first audio stream, if any).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Duration in seconds.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    /// Bit rate as reported by the prober (bits per second, as text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

/// A file that was skipped during a scan, and why.
#[derive(Debug)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub error: Exn<ErrorKind>,
}

/// Outcome of a scan: records and warnings, each in visitation order.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub records: Vec<MediaRecord>,
    pub warnings: Vec<ScanWarning>,
}

impl ScanResult {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn photo_record() -> MediaRecord {
        MediaRecord {
            name: "a.jpg".to_string(),
            path: PathBuf::from("/photos/a.jpg"),
            size: 1024,
            modified: datetime!(2024-06-01 12:00:00 UTC),
            created: None,
            metadata: MediaMetadata::Photo(PhotoMetadata {
                iso: Some(200),
                aperture: Some(2.8),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_kind_follows_metadata() {
        let mut record = photo_record();
        assert_eq!(record.kind(), MediaKind::Photo);
        record.metadata = MediaMetadata::Video(VideoMetadata::default());
        assert_eq!(record.kind(), MediaKind::Video);
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(photo_record()).unwrap();
        assert_eq!(value["modified"], "2024-06-01T12:00:00Z");
        assert_eq!(value["metadata"]["kind"], "photo");
        assert_eq!(value["metadata"]["iso"], 200);
        assert!(value.get("created").is_none());
        assert!(value["metadata"].get("make").is_none());
        let parsed: MediaRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, photo_record());
    }
}
