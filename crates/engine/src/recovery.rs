//! Cross-run recovery.
//!
//! Runs once before discovery and reconciles whatever a previous run left
//! behind: orphaned temp files, markers whose owner died, and published
//! outputs that no longer parse. Afterwards the destination holds no temp
//! files, no dead-owner markers, and only artifacts that verified at least
//! once in this run.

use crate::classify::MediaKind;
use crate::logger::Logger;
use crate::marker;
use crate::plan;
use crate::stats::RunStats;
use crate::verify::Verifier;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Sweep temp files and stale markers, then re-verify published outputs.
pub fn perform_recovery(
    dest_root: &Path,
    verifier: &Verifier,
    logger: &Logger,
    stats: &RunStats,
) {
    logger.info("🔍 Performing recovery check...");

    sweep_temp_files(dest_root, logger, stats);
    sweep_stale_markers(dest_root, logger, stats);
    verify_published_outputs(dest_root, verifier, logger, stats);

    logger.success("Recovery check completed");
}

/// Delete every `*.tmp` under the destination root. Interrupted encodes
/// never publish, so a temp file is garbage by definition.
fn sweep_temp_files(dest_root: &Path, logger: &Logger, stats: &RunStats) {
    for entry in WalkDir::new(dest_root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_temp = path.extension().map(|ext| ext == "tmp").unwrap_or(false);
        if !is_temp {
            continue;
        }

        match fs::remove_file(path) {
            Ok(()) => {
                logger.warn(&format!(
                    "🧹 Removed abandoned temp file: {}",
                    path.display()
                ));
                stats.file_cleaned();
            }
            Err(err) => {
                logger.warn(&format!("Failed to remove {}: {}", path.display(), err));
            }
        }
    }
}

/// Delete markers whose owner process is gone or whose content is garbage.
fn sweep_stale_markers(dest_root: &Path, logger: &Logger, stats: &RunStats) {
    let stale = marker::scan_stale_markers(dest_root);
    if stale.is_empty() {
        return;
    }

    logger.info(&format!(
        "🔄 Found {} abandoned conversion markers",
        stale.len()
    ));
    for path in stale {
        match fs::remove_file(&path) {
            Ok(()) => stats.file_cleaned(),
            Err(err) => {
                logger.warn(&format!("Failed to remove marker {}: {}", path.display(), err))
            }
        }
    }
}

/// Which published outputs are candidates for re-verification.
///
/// Photos: anything with a photo output extension. Videos: `.mp4` whose
/// name matches the canonical published pattern, so foreign videos that
/// merely live under the destination are left alone.
fn recovery_kind(path: &Path) -> Option<MediaKind> {
    let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();

    match ext.as_str() {
        "avif" | "webp" => Some(MediaKind::Photo),
        "mp4" => {
            let name = path.file_name()?.to_str()?;
            if plan::published_name_regex().is_match(name) {
                Some(MediaKind::Video)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Re-run the corruption check over everything previously published;
/// corrupt artifacts are deleted so the passes re-encode them.
fn verify_published_outputs(
    dest_root: &Path,
    verifier: &Verifier,
    logger: &Logger,
    stats: &RunStats,
) {
    for entry in WalkDir::new(dest_root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let kind = match recovery_kind(path) {
            Some(kind) => kind,
            None => continue,
        };

        if verifier.is_corrupt(path, kind) {
            logger.warn(&format!(
                "🔍 Corrupted {} detected: {} (will be re-converted)",
                kind,
                path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            ));
            let _ = fs::remove_file(path);
            stats.file_recovered();
        } else {
            stats.file_verified();
        }
    }
}
