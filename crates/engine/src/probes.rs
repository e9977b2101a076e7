//! Platform probes: free disk space, process existence, directory size.

use crate::classify;
use std::path::Path;
use thiserror::Error;

/// Error type for platform probe operations
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to query free space for {path}: {source}")]
    StatFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Free-space probe not supported on this platform")]
    Unsupported,
}

/// Bytes available to unprivileged writers on the filesystem holding `path`.
#[cfg(unix)]
pub fn available_space(path: &Path) -> Result<u64, ProbeError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| ProbeError::StatFailed {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
    })?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(ProbeError::StatFailed {
            path: path.display().to_string(),
            source: std::io::Error::last_os_error(),
        });
    }

    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> Result<u64, ProbeError> {
    Err(ProbeError::Unsupported)
}

/// Whether a process with the given pid is alive.
///
/// `kill(pid, 0)` delivers no signal; EPERM means the process exists but is
/// owned by someone else, so it counts as alive.
#[cfg(unix)]
pub fn process_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }

    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }

    std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

/// A single process owns the destination root for the duration of a run, so
/// an unverifiable owner is treated as gone.
#[cfg(not(unix))]
pub fn process_exists(_pid: i32) -> bool {
    false
}

/// Total size in bytes of the media content under `root`, skipping the same
/// OS metadata entries the classifier skips. Unreadable subtrees contribute
/// nothing instead of failing the probe.
pub fn dir_size(root: &Path) -> u64 {
    let mut size = 0u64;

    let walker = walkdir::WalkDir::new(root).into_iter().filter_entry(|entry| {
        if entry.file_type().is_dir() && entry.depth() > 0 {
            if let Some(name) = entry.file_name().to_str() {
                return !classify::should_skip_dir(name);
            }
        }
        true
    });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if classify::should_skip_file(name) {
                continue;
            }
        }
        if let Ok(metadata) = entry.metadata() {
            size += metadata.len();
        }
    }

    size
}
