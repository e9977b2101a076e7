//! Capture-date resolution.
//!
//! A file's capture date comes from its own metadata whenever possible;
//! the filesystem modification time is only a validated last resort, and a
//! file with no plausible date at all is rejected rather than silently
//! filed under today.

use crate::classify::MediaKind;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error type for date resolution
#[derive(Debug, Error)]
pub enum DateError {
    #[error("no valid date found for file: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the capture date for a media file.
///
/// Sources are tried in order, stopping at the first that yields a date
/// inside the accepted window:
/// 1. Platform content-creation metadata (macOS `mdls`)
/// 2. EXIF / embedded image metadata via `magick identify` (photos)
/// 3. Container creation_time via `ffprobe` (videos)
/// 4. Filesystem modification time
pub fn resolve_capture_date(path: &Path, kind: MediaKind) -> Result<NaiveDateTime, DateError> {
    #[cfg(target_os = "macos")]
    if let Some(date) = macos_metadata_date(path).filter(|d| is_valid_date(*d)) {
        return Ok(date);
    }

    match kind {
        MediaKind::Photo => {
            if let Some(date) = image_metadata_date(path).filter(|d| is_valid_date(*d)) {
                return Ok(date);
            }
        }
        MediaKind::Video => {
            if let Some(date) = video_metadata_date(path).filter(|d| is_valid_date(*d)) {
                return Ok(date);
            }
        }
    }

    let metadata = std::fs::metadata(path)?;
    if let Ok(modified) = metadata.modified() {
        let mod_date = DateTime::<Local>::from(modified).naive_local();
        if is_valid_date(mod_date) {
            return Ok(mod_date);
        }
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Err(DateError::NotFound(filename))
}

/// Content-creation date from Spotlight metadata. RAW formats often carry
/// their capture time only here.
#[cfg(target_os = "macos")]
fn macos_metadata_date(path: &Path) -> Option<NaiveDateTime> {
    let output = Command::new("mdls")
        .args(["-name", "kMDItemContentCreationDate", "-raw"])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let value = raw.trim();
    if value.is_empty() || value == "(null)" {
        return None;
    }

    parse_datetime(value)
}

/// EXIF fields tried in order of preference: camera capture time first,
/// generic creation/modify times last.
const EXIF_FIELDS: &[&str] = &[
    "%[EXIF:DateTimeOriginal]",
    "%[EXIF:DateTime]",
    "%[date:create]",
    "%[date:modify]",
];

fn image_metadata_date(path: &Path) -> Option<NaiveDateTime> {
    for field in EXIF_FIELDS {
        let output = Command::new("magick")
            .args(["identify", "-format", field])
            .arg(path)
            .output();

        let output = match output {
            Ok(o) if o.status.success() => o,
            _ => continue,
        };

        let raw = String::from_utf8_lossy(&output.stdout);
        let value = raw.trim();
        if value.is_empty() || value == "(null)" {
            continue;
        }

        if let Some(date) = parse_datetime(value) {
            return Some(date);
        }
    }

    None
}

fn video_metadata_date(path: &Path) -> Option<NaiveDateTime> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-show_entries",
            "format_tags=creation_time",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    parse_datetime(value)
}

/// Parse the date formats seen in media metadata. Zoned values keep their
/// recorded wall-clock time; the offset is not re-projected.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    // EXIF uses colons in the date part
    if let Ok(date) = NaiveDateTime::parse_from_str(value, "%Y:%m:%d %H:%M:%S") {
        return Some(date);
    }

    // ISO-8601 / RFC3339, with or without fractional seconds
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.naive_local());
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(date) = NaiveDateTime::parse_from_str(value, format) {
            return Some(date);
        }
    }

    // `mdls` style: "2024-01-15 10:30:45 +0000"
    for format in ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(date) = DateTime::parse_from_str(value, format) {
            return Some(date.naive_local());
        }
    }

    None
}

/// A capture date is plausible iff it is neither in the future nor before
/// the digital-photography era.
pub fn is_valid_date(date: NaiveDateTime) -> bool {
    let min = NaiveDate::from_ymd_opt(1990, 1, 1)
        .expect("constant date")
        .and_hms_opt(0, 0, 0)
        .expect("constant time");

    date >= min && date <= Local::now().naive_local()
}
