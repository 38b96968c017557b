//! Photo metadata: image header dimensions plus EXIF tags.

use crate::error::{ErrorKind, Result};
use crate::models::{GeoLocation, PhotoMetadata};
use exif::{Exif, In, Rational, Tag, Value};
use exn::ResultExt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Read the photo's dimensions and EXIF tags.
///
/// A header that can't be decoded means the file is not an image, which is an
/// error. Missing or malformed EXIF data is not: those fields stay unset.
pub(crate) fn extract(path: &Path) -> Result<PhotoMetadata> {
    let (width, height) = dimensions(path)?;
    let mut metadata = match read_exif(path)? {
        Some(exif) => from_exif(&exif),
        None => PhotoMetadata::default(),
    };
    metadata.width = Some(width);
    metadata.height = Some(height);
    Ok(metadata)
}

fn dimensions(path: &Path) -> Result<(u32, u32)> {
    let reader = image::ImageReader::open(path).map_err(|e| ErrorKind::io(e, path))?;
    let reader = reader.with_guessed_format().map_err(|e| ErrorKind::io(e, path))?;
    reader.into_dimensions().or_raise(|| ErrorKind::InvalidImage(path.to_path_buf()))
}

fn read_exif(path: &Path) -> Result<Option<Exif>> {
    let file = File::open(path).map_err(|e| ErrorKind::io(e, path))?;
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Ok(Some(exif)),
        Err(exif::Error::Io(e)) => Err(ErrorKind::io(e, path).into()),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No usable EXIF data");
            Ok(None)
        },
    }
}

fn from_exif(exif: &Exif) -> PhotoMetadata {
    PhotoMetadata {
        taken_at: taken_at(exif),
        location: location(exif),
        make: ascii(exif, Tag::Make),
        model: ascii(exif, Tag::Model),
        lens: ascii(exif, Tag::LensModel),
        exposure_time: rational(exif, Tag::ExposureTime),
        aperture: rational(exif, Tag::FNumber),
        iso: uint(exif, Tag::PhotographicSensitivity),
        focal_length: rational(exif, Tag::FocalLength),
        flash_fired: uint(exif, Tag::Flash).map(|flash| flash & 1 == 1),
        orientation: uint(exif, Tag::Orientation),
        exposure_program: uint(exif, Tag::ExposureProgram),
        white_balance: uint(exif, Tag::WhiteBalance),
        width: None,
        height: None,
    }
}

/// Convert an EXIF rational, refusing a zero denominator.
pub(crate) fn rational_to_f64(value: &Rational) -> Option<f64> {
    match value.denom {
        0 => None,
        denom => Some(f64::from(value.num) / f64::from(denom)),
    }
}

fn rational(exif: &Exif, tag: Tag) -> Option<f64> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(ref values) => values.first().and_then(rational_to_f64),
        _ => None,
    }
}

fn uint(exif: &Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)?.value.get_uint(0)
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(ref values) => {
            let text = String::from_utf8_lossy(values.first()?);
            let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            (!text.is_empty()).then(|| text.to_string())
        },
        _ => None,
    }
}

fn ascii_bytes(exif: &Exif, tag: Tag) -> Option<&[u8]> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(ref values) => values.first().map(Vec::as_slice),
        _ => None,
    }
}

/// Capture time from `DateTimeOriginal`, falling back to `DateTime`. The
/// matching offset tag is applied when present; otherwise UTC.
fn taken_at(exif: &Exif) -> Option<OffsetDateTime> {
    [(Tag::DateTimeOriginal, Tag::OffsetTimeOriginal), (Tag::DateTime, Tag::OffsetTime)]
        .into_iter()
        .find_map(|(tag, offset_tag)| {
            let mut parsed = exif::DateTime::from_ascii(ascii_bytes(exif, tag)?).ok()?;
            if let Some(offset) = ascii_bytes(exif, offset_tag) {
                // A malformed offset leaves the timestamp in UTC.
                let _ = parsed.parse_offset(offset);
            }
            to_offset_datetime(&parsed)
        })
}

fn to_offset_datetime(dt: &exif::DateTime) -> Option<OffsetDateTime> {
    let date = Date::from_calendar_date(i32::from(dt.year), Month::try_from(dt.month).ok()?, dt.day).ok()?;
    let time = Time::from_hms_nano(dt.hour, dt.minute, dt.second, dt.nanosecond.unwrap_or(0)).ok()?;
    let offset = match dt.offset {
        Some(minutes) => UtcOffset::from_whole_seconds(i32::from(minutes) * 60).ok()?,
        None => UtcOffset::UTC,
    };
    Some(PrimitiveDateTime::new(date, time).assume_offset(offset))
}

fn location(exif: &Exif) -> Option<GeoLocation> {
    let latitude = coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let longitude = coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;
    Some(GeoLocation { latitude, longitude })
}

/// Degrees/minutes/seconds to signed decimal degrees.
fn coordinate(exif: &Exif, tag: Tag, reference: Tag, negative: u8) -> Option<f64> {
    let Value::Rational(ref dms) = exif.get_field(tag, In::PRIMARY)?.value else {
        return None;
    };
    let [degrees, minutes, seconds] = dms.get(..3)? else {
        return None;
    };
    let value = rational_to_f64(degrees)? + rational_to_f64(minutes)? / 60.0 + rational_to_f64(seconds)? / 3600.0;
    let sign = match ascii_bytes(exif, reference).and_then(|r| r.first()) {
        Some(r) if r.eq_ignore_ascii_case(&negative) => -1.0,
        _ => 1.0,
    };
    Some(sign * value)
}
