//! Output integrity verification.
//!
//! An encoded artifact is only trusted once it exists, is plausibly sized
//! relative to its input, and survives a decoder parse. Anything that fails
//! is deleted on the spot so a later run never mistakes it for a good
//! output.

use crate::classify::MediaKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Error type for verification failures
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("output file does not exist: {0}")]
    Missing(PathBuf),

    #[error("output file is empty: {0}")]
    Empty(PathBuf),

    #[error(
        "output file too small ({output_bytes} < {min_bytes} bytes, ratio {ratio:.3} for {format}): {path}"
    )]
    TooSmall {
        path: PathBuf,
        output_bytes: u64,
        min_bytes: u64,
        ratio: f64,
        format: String,
    },

    #[error("{kind} failed decoder parse: {path}")]
    ParseFailed { path: PathBuf, kind: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Integrity verifier with per-format size-ratio floors.
pub struct Verifier {
    ratio_generic: f64,
    ratio_avif: f64,
    ratio_webp: f64,
    /// Identify/convert helper used for photo parse checks
    magick_cmd: String,
    /// Probe binary used for video parse checks
    ffprobe_cmd: String,
}

impl Verifier {
    pub fn new(ratio_generic: f64, ratio_avif: f64, ratio_webp: f64) -> Self {
        Self {
            ratio_generic,
            ratio_avif,
            ratio_webp,
            magick_cmd: "magick".to_string(),
            ffprobe_cmd: "ffprobe".to_string(),
        }
    }

    pub fn from_config(config: &mediapress_config::Config) -> Self {
        Self::new(
            config.min_output_size_ratio,
            config.min_output_size_ratio_avif,
            config.min_output_size_ratio_webp,
        )
    }

    /// Replace the probe binaries. Tests substitute `true`/`false` here so
    /// parse checks run without real decoders installed.
    pub fn with_probe_commands(mut self, magick: &str, ffprobe: &str) -> Self {
        self.magick_cmd = magick.to_string();
        self.ffprobe_cmd = ffprobe.to_string();
        self
    }

    fn ratio_for(&self, kind: MediaKind, output_format: &str) -> f64 {
        if kind == MediaKind::Photo {
            match output_format.to_lowercase().as_str() {
                "avif" => self.ratio_avif,
                "webp" => self.ratio_webp,
                _ => self.ratio_generic,
            }
        } else {
            self.ratio_generic
        }
    }

    /// Best-effort decoder round trip; exit code zero is a pass.
    fn parse_check(&self, path: &Path, kind: MediaKind) -> bool {
        let status = match kind {
            MediaKind::Photo => Command::new(&self.magick_cmd)
                .arg("identify")
                .arg(path)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status(),
            MediaKind::Video => Command::new(&self.ffprobe_cmd)
                .arg(path)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status(),
        };

        matches!(status, Ok(s) if s.success())
    }

    /// Whether an already-published artifact is corrupt: missing, empty, or
    /// unreadable by its decoder. Used during dedupe and recovery to decide
    /// between keeping an output and re-encoding it.
    pub fn is_corrupt(&self, path: &Path, kind: MediaKind) -> bool {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => return true,
        };

        if metadata.len() == 0 {
            return true;
        }

        !self.parse_check(path, kind)
    }

    /// Verify a freshly encoded output against its input. Deletes the
    /// output on every failure path before returning the error.
    pub fn verify_output(
        &self,
        input_path: &Path,
        output_path: &Path,
        kind: MediaKind,
        output_format: &str,
    ) -> Result<(), VerifyError> {
        let output_info = match std::fs::metadata(output_path) {
            Ok(m) => m,
            Err(_) => return Err(VerifyError::Missing(output_path.to_path_buf())),
        };

        if output_info.len() == 0 {
            let _ = std::fs::remove_file(output_path);
            return Err(VerifyError::Empty(output_path.to_path_buf()));
        }

        let input_info = std::fs::metadata(input_path)?;
        let ratio = self.ratio_for(kind, output_format);
        let min_bytes = (input_info.len() as f64 * ratio) as u64;
        if output_info.len() < min_bytes {
            let _ = std::fs::remove_file(output_path);
            return Err(VerifyError::TooSmall {
                path: output_path.to_path_buf(),
                output_bytes: output_info.len(),
                min_bytes,
                ratio,
                format: output_format.to_string(),
            });
        }

        if !self.parse_check(output_path, kind) {
            let _ = std::fs::remove_file(output_path);
            return Err(VerifyError::ParseFailed {
                path: output_path.to_path_buf(),
                kind: kind.as_str(),
            });
        }

        Ok(())
    }
}
