//! External tool resolution and capability probing.
//!
//! The engine shells out to `ffmpeg`, `ffprobe`, and `magick`; this module
//! checks they exist before the run starts, picks the best ffmpeg binary on
//! Apple Silicon, and probes hardware-encoder availability. The pipeline
//! holds the probe result for the run; nothing here is process-global.

use std::process::{Command, Stdio};
use thiserror::Error;

/// Error type for missing external dependencies
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("missing dependencies: {0}")]
    Missing(String),
}

/// Binaries the engine requires on PATH.
const REQUIRED_TOOLS: &[&str] = &["ffmpeg", "ffprobe", "magick"];

fn tool_responds(command: &str) -> bool {
    Command::new(command)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Verify every required external tool responds to `-version`.
pub fn check_dependencies() -> Result<(), DependencyError> {
    let missing: Vec<&str> = REQUIRED_TOOLS
        .iter()
        .filter(|tool| !tool_responds(tool))
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DependencyError::Missing(missing.join(", ")))
    }
}

/// Resolved ffmpeg invocation plus an optional startup message about the
/// choice (surfaced once at banner time).
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    pub program: String,
    pub message: Option<String>,
}

/// Pick the ffmpeg binary to run.
///
/// On Apple Silicon the Homebrew arm64 build is preferred over whatever is
/// first in PATH; Rosetta builds encode video dramatically slower.
pub fn resolve_ffmpeg() -> FfmpegCommand {
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    {
        for candidate in [
            "/opt/homebrew/bin/ffmpeg",
            "/opt/homebrew/opt/ffmpeg/bin/ffmpeg",
        ] {
            if std::path::Path::new(candidate).exists() {
                return FfmpegCommand {
                    program: candidate.to_string(),
                    message: Some(format!("Using Apple Silicon ffmpeg at {}", candidate)),
                };
            }
        }
    }

    FfmpegCommand {
        program: "ffmpeg".to_string(),
        message: None,
    }
}

/// What the hardware-encode probe found.
#[derive(Debug, Clone)]
pub struct AccelerationInfo {
    pub available: bool,
    pub message: String,
}

impl AccelerationInfo {
    fn unavailable(message: &str) -> Self {
        Self {
            available: false,
            message: message.to_string(),
        }
    }
}

/// How long the encoder-list probe may run before it is killed.
#[cfg(target_os = "macos")]
const ACCEL_PROBE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Whether the platform's H.265 hardware encoder is usable.
///
/// The probe only exists on macOS (VideoToolbox). The result is advisory:
/// callers fall back to software encoding when an accelerated encode
/// fails. Callers that want the value once per run hold it themselves;
/// nothing is cached process-wide.
pub fn video_acceleration(ffmpeg: &str, enabled: bool) -> AccelerationInfo {
    if !enabled {
        return AccelerationInfo::unavailable("Acceleration disabled in config");
    }

    probe_acceleration(ffmpeg)
}

#[cfg(target_os = "macos")]
fn probe_acceleration(ffmpeg: &str) -> AccelerationInfo {
    match encoder_list(ffmpeg) {
        Some(encoders) if encoders.contains("hevc_videotoolbox") => AccelerationInfo {
            available: true,
            message: "VideoToolbox H.265 encoder available".to_string(),
        },
        Some(_) => AccelerationInfo::unavailable("VideoToolbox H.265 encoder not available"),
        None => AccelerationInfo::unavailable("FFmpeg not found or error checking encoders"),
    }
}

/// Run `ffmpeg -hide_banner -encoders` under the probe deadline, killing
/// the child on expiry like every other external invocation.
#[cfg(target_os = "macos")]
fn encoder_list(ffmpeg: &str) -> Option<String> {
    use std::io::Read;
    use std::time::{Duration, Instant};

    let mut child = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let mut stdout = child.stdout.take()?;
    let reader = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + ACCEL_PROBE_TIMEOUT;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return None;
            }
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            let _ = reader.join();
            return None;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let encoders = reader.join().unwrap_or_default();
    if status.success() {
        Some(encoders)
    } else {
        None
    }
}

#[cfg(not(target_os = "macos"))]
fn probe_acceleration(_ffmpeg: &str) -> AccelerationInfo {
    AccelerationInfo::unavailable("Hardware acceleration not supported on this platform")
}
