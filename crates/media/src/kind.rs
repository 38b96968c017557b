use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// Media category, decided by file extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Classify a file extension (without the dot), ignoring case.
    ///
    /// ```
    /// use memorix_media::MediaKind;
    /// assert_eq!(MediaKind::from_extension("JPG"), Some(MediaKind::Photo));
    /// assert_eq!(MediaKind::from_extension("mkv"), Some(MediaKind::Video));
    /// assert_eq!(MediaKind::from_extension("txt"), None);
    /// ```
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Photo)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Classify a path by its extension. Files without one are unrecognised.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref().extension().and_then(|ext| ext.to_str()).and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
