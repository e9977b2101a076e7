//! Processing markers.
//!
//! A marker is a sibling of a planned output named `<output>.processing`.
//! Its presence means "some process intends to publish this output"; it
//! records the owner's pid so a later run can tell an in-flight conversion
//! from the leftovers of a dead one.

use crate::probes;
use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Constructs the marker path for a given output file.
///
/// For example: `/dest/2024-03-15_a_001.avif` ->
/// `/dest/2024-03-15_a_001.avif.processing`
pub fn marker_path(output_path: &Path) -> PathBuf {
    let mut marker = output_path.as_os_str().to_owned();
    marker.push(".processing");
    PathBuf::from(marker)
}

/// Claim an output by writing its marker.
///
/// Written through a temp sibling and renamed into place so a scan never
/// observes a half-written marker.
pub fn claim_marker(output_path: &Path) -> io::Result<()> {
    let marker = marker_path(output_path);
    let content = format!(
        "PID:{}\nStarted:{}\nFile:{}\n",
        std::process::id(),
        Local::now().to_rfc3339(),
        output_path.display()
    );

    let staging = marker.with_extension("processing.tmp");
    fs::write(&staging, content)?;
    fs::rename(&staging, &marker)
}

/// Release a claim. A marker already gone is not an error.
pub fn release_marker(output_path: &Path) -> io::Result<()> {
    match fs::remove_file(marker_path(output_path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Whether a marker file exists and its owner is still running.
pub fn is_live_marker(output_path: &Path) -> bool {
    let marker = marker_path(output_path);
    marker.exists() && !is_stale_marker(&marker)
}

/// Extract the owner pid from marker content.
fn parse_owner_pid(content: &str) -> Option<i32> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("PID:"))
        .and_then(|pid| pid.trim().parse::<i32>().ok())
}

/// A marker is stale when its content is unreadable, carries no parseable
/// pid, or names a pid that is no longer running.
pub fn is_stale_marker(marker: &Path) -> bool {
    let content = match fs::read_to_string(marker) {
        Ok(c) => c,
        Err(_) => return true,
    };

    match parse_owner_pid(&content) {
        Some(pid) => !probes::process_exists(pid),
        None => true,
    }
}

/// Enumerate every stale marker under `root`.
pub fn scan_stale_markers(root: &Path) -> Vec<PathBuf> {
    let mut stale = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_marker = path
            .extension()
            .map(|ext| ext == "processing")
            .unwrap_or(false);
        if is_marker && is_stale_marker(path) {
            stale.push(path.to_path_buf());
        }
    }

    stale
}
