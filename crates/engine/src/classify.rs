//! Source discovery and media-kind classification.
//!
//! Walks the source tree, skips OS metadata entries, and buckets files into
//! photos and videos by extension. Unknown extensions are dropped silently.

use crate::logger::Logger;
use mediapress_config::Config;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Kind of a media file, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Short name used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }

    /// Leaf directory name in the destination tree
    pub fn dest_subdir(&self) -> &'static str {
        match self {
            MediaKind::Photo => "images",
            MediaKind::Video => "videos",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory names that hold OS metadata, never media.
const SYSTEM_DIRS: &[&str] = &[
    ".Trashes",
    ".Spotlight-V100",
    ".fseventsd",
    ".TemporaryItems",
    "__MACOSX",
    "@eaDir",
    "$RECYCLE.BIN",
    "System Volume Information",
];

/// File names that are sidecar metadata, never media.
const SYSTEM_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Whether a directory entry name is an OS metadata folder to skip.
pub fn should_skip_dir(name: &str) -> bool {
    SYSTEM_DIRS.contains(&name) || name.starts_with("._")
}

/// Whether a file entry name is a sidecar metadata entry to skip.
/// AppleDouble companions (`._photo.jpg`) carry resource forks, not media.
pub fn should_skip_file(name: &str) -> bool {
    SYSTEM_FILES.contains(&name) || name.starts_with("._")
}

/// Case-insensitive extension membership test against a configured set.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_lowercase(),
        None => return false,
    };
    extensions.iter().any(|valid| *valid == ext)
}

/// Classify a single path by extension, or None when it is neither kind.
pub fn classify_path(path: &Path, config: &Config) -> Option<MediaKind> {
    if has_extension(path, &config.photo_extensions) {
        Some(MediaKind::Photo)
    } else if has_extension(path, &config.video_extensions) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// All convertible files found under the source root.
#[derive(Debug, Default)]
pub struct SourceInventory {
    pub photos: Vec<PathBuf>,
    pub videos: Vec<PathBuf>,
}

impl SourceInventory {
    pub fn total(&self) -> usize {
        self.photos.len() + self.videos.len()
    }
}

/// Walk the source tree and bucket media files by kind.
///
/// Unreadable subtrees are skipped rather than aborting discovery; the
/// errors surface only at debug level.
pub fn discover_sources(root: &Path, config: &Config, logger: &Logger) -> SourceInventory {
    let mut inventory = SourceInventory::default();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.file_type().is_dir() && entry.depth() > 0 {
            if let Some(name) = entry.file_name().to_str() {
                return !should_skip_dir(name);
            }
        }
        true
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                logger.debug(&format!("Skipping unreadable entry: {}", err));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(name) = entry.file_name().to_str() {
            if should_skip_file(name) {
                continue;
            }
        }

        match classify_path(entry.path(), config) {
            Some(MediaKind::Photo) => inventory.photos.push(entry.path().to_path_buf()),
            Some(MediaKind::Video) => inventory.videos.push(entry.path().to_path_buf()),
            None => {}
        }
    }

    inventory
}

/// Find one small photo to exercise the end-to-end encode path before the
/// real passes start. Prefers jpg/jpeg over RAW formats for speed.
pub fn find_safety_test_file(root: &Path, config: &Config) -> Option<PathBuf> {
    let mut fallback: Option<PathBuf> = None;
    let jpeg_exts = ["jpg".to_string(), "jpeg".to_string()];

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.file_type().is_dir() && entry.depth() > 0 {
            if let Some(name) = entry.file_name().to_str() {
                return !should_skip_dir(name);
            }
        }
        true
    });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if should_skip_file(name) {
                continue;
            }
        }

        let path = entry.path();
        if !has_extension(path, &config.photo_extensions) {
            continue;
        }
        if has_extension(path, &jpeg_exts) {
            return Some(path.to_path_buf());
        }
        if fallback.is_none() {
            fallback = Some(path.to_path_buf());
        }
    }

    fallback
}
