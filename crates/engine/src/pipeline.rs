//! Per-file conversion pipeline.
//!
//! One input moves through classify → plan → dedupe → stage → encode →
//! verify → publish, with a marker held around the critical region and a
//! cleanup guard that removes the marker and any leftover temp file on
//! every exit path. Publication is a single rename, so an observer sees
//! either nothing or a verified output, never a partial file.

use crate::classify::MediaKind;
use crate::dates::{self, DateError};
use crate::encode::{photo, video, EncodeError};
use crate::logger::{progress_bar, Logger};
use crate::marker;
use crate::plan::{self, PlanError};
use crate::stats::{format_duration, RunStats};
use crate::tools::{self, AccelerationInfo, FfmpegCommand};
use crate::verify::{Verifier, VerifyError};
use mediapress_config::{Config, VideoCodec};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;
use thiserror::Error;

/// Error type for a single pipeline execution
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Date(#[from] DateError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a pipeline execution ended (errors aside)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new output was encoded, verified, and renamed into place
    Published,
    /// A valid output already existed; nothing was done
    Skipped,
    /// Dry-run mode: the plan was logged, no encoder ran
    DryRun,
}

/// Removes the marker and any leftover temp file once a staged execution
/// exits, whatever the path out.
struct StageGuard<'p> {
    output: &'p Path,
    temp: &'p Path,
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        let _ = marker::release_marker(self.output);
        if self.temp.exists() {
            let _ = fs::remove_file(self.temp);
        }
    }
}

/// Shared context for converting files within one run.
pub struct Pipeline<'a> {
    config: &'a Config,
    logger: &'a Logger,
    stats: &'a RunStats,
    verifier: &'a Verifier,
    ffmpeg: FfmpegCommand,
    magick_program: String,
    /// Hardware-capability probe result, resolved on the first video
    /// encode and held for the rest of the run.
    accel: OnceLock<AccelerationInfo>,
    /// Output paths allocated by this run. A name in here is taken even if
    /// nothing is on disk yet (or the file was already published); names
    /// from earlier runs are instead handled by the dedupe check.
    claimed: Mutex<HashSet<PathBuf>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        logger: &'a Logger,
        stats: &'a RunStats,
        verifier: &'a Verifier,
    ) -> Self {
        Self {
            config,
            logger,
            stats,
            verifier,
            ffmpeg: tools::resolve_ffmpeg(),
            magick_program: "magick".to_string(),
            accel: OnceLock::new(),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Substitute the encoder binaries. Tests point these at stub scripts.
    pub fn with_programs(mut self, magick: &str, ffmpeg: &str) -> Self {
        self.magick_program = magick.to_string();
        self.ffmpeg = FfmpegCommand {
            program: ffmpeg.to_string(),
            message: None,
        };
        // Any capability result probed from the previous binary is void.
        self.accel = OnceLock::new();
        self
    }

    /// Startup message about the resolved ffmpeg binary, if any.
    pub fn ffmpeg_message(&self) -> Option<&str> {
        self.ffmpeg.message.as_deref()
    }

    /// Convert one file into the configured destination.
    pub fn convert_file(&self, input: &Path, kind: MediaKind) -> Result<Outcome, PipelineError> {
        self.convert_into(
            input,
            kind,
            &self.config.dest_dir,
            self.config.organize_by_date,
            self.config.keep_originals,
        )
    }

    /// Convert one file with explicit destination and safety options. The
    /// safety probe uses this to encode into a scratch directory without
    /// touching the real tree or the shared config.
    pub fn convert_into(
        &self,
        input: &Path,
        kind: MediaKind,
        dest_root: &Path,
        organize_by_date: bool,
        keep_originals: bool,
    ) -> Result<Outcome, PipelineError> {
        let filename = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());

        // Capture date first; a file with no plausible date is rejected.
        let date = match dates::resolve_capture_date(input, kind) {
            Ok(date) => date,
            Err(err) => {
                self.logger.warn(&format!(
                    "Could not extract date from {}: {} - skipping file",
                    filename, err
                ));
                return Err(err.into());
            }
        };

        let extension = match kind {
            MediaKind::Photo => self.config.photo_format.extension(),
            MediaKind::Video => "mp4",
        };
        let directory = plan::destination_dir(
            dest_root,
            date.date(),
            kind,
            organize_by_date,
            &self.config.language,
        );
        let base = plan::base_filename(&stem, extension, date.date());
        let output_path = self.allocate_output(&directory, &base)?;
        let output_name = output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let emoji = match kind {
            MediaKind::Photo => "📷",
            MediaKind::Video => "📹",
        };

        // Dedupe against earlier runs: a valid output wins, a corrupt one
        // is cleared for re-encoding.
        if output_path.exists() {
            if !self.verifier.is_corrupt(&output_path, kind) {
                self.logger.info(&format!(
                    "{} {} -> {} (already exists and valid, skipping)",
                    emoji, filename, output_name
                ));
                self.stats.file_skipped();
                return Ok(Outcome::Skipped);
            }

            self.logger.warn(&format!(
                "{} {} -> {} (corrupted file detected, re-converting)",
                emoji, filename, output_name
            ));
            fs::remove_file(&output_path)?;
            self.stats.file_recovered();
        }

        if self.config.dry_run {
            self.logger.info(&format!(
                "[DRY-RUN] Would convert: {} → {}",
                filename, output_name
            ));
            return Ok(Outcome::DryRun);
        }

        fs::create_dir_all(&directory)?;

        let input_size = fs::metadata(input)?.len();
        let input_mb = input_size as f64 / (1024.0 * 1024.0);
        self.logger.info(&format!(
            "{} {} ({:.1} MB) -> {}",
            emoji, filename, input_mb, extension
        ));

        if let Err(err) = marker::claim_marker(&output_path) {
            self.logger
                .warn(&format!("Failed to create processing marker: {}", err));
        }

        let temp = plan::temp_path(&output_path);
        let guard = StageGuard {
            output: &output_path,
            temp: &temp,
        };

        let encode_started = Instant::now();
        match kind {
            MediaKind::Photo => photo::run_photo_encode(
                &self.magick_program,
                input,
                &temp,
                self.config.photo_format,
                self.config.photo_quality(),
                self.config.photo_timeout(),
            )?,
            MediaKind::Video => self.encode_video(input, &temp, input_size, &filename)?,
        }

        self.verifier
            .verify_output(input, &temp, kind, extension)?;

        // Atomic publication; the marker is released only afterwards.
        fs::rename(&temp, &output_path)?;
        drop(guard);

        let output_size = fs::metadata(&output_path)?.len();
        let output_mb = output_size as f64 / (1024.0 * 1024.0);
        let reduction = if input_size > 0 {
            (input_size as i64 - output_size as i64) * 100 / input_size as i64
        } else {
            0
        };

        self.logger.success(&format!(
            "✅ {} -> {} | -{}% ({:.1}->{:.1} MB) | {}",
            filename,
            output_name,
            reduction,
            input_mb,
            output_mb,
            format_duration(encode_started.elapsed())
        ));
        self.stats.add_size_stats(input_mb, output_mb);

        if !keep_originals {
            self.safe_delete(input, &output_path, &filename);
        }

        Ok(Outcome::Published)
    }

    /// Pick the output path for a planned base name.
    ///
    /// Names already allocated by this run, or held by a live marker, are
    /// collisions and get a `_NNN` variant; a name that merely exists on
    /// disk is left for the dedupe check, which knows whether to keep it.
    fn allocate_output(&self, directory: &Path, base: &str) -> Result<PathBuf, PlanError> {
        let mut claimed = self.claimed.lock().unwrap();
        let name = plan::allocate_name(base, |candidate| {
            let path = directory.join(candidate);
            claimed.contains(&path) || marker::is_live_marker(&path)
        })?;

        let path = directory.join(name);
        claimed.insert(path.clone());
        Ok(path)
    }

    fn encode_video(
        &self,
        input: &Path,
        temp: &Path,
        input_size: u64,
        filename: &str,
    ) -> Result<(), EncodeError> {
        let accel = self.accel.get_or_init(|| {
            tools::video_acceleration(&self.ffmpeg.program, self.config.video_acceleration)
        });

        // The bitrate estimate is only needed on the hardware path, and the
        // duration probe costs a process spawn.
        let (size, duration) = if accel.available
            && self.config.video_acceleration
            && self.config.video_codec == VideoCodec::H265
        {
            (Some(input_size), video::video_duration(input))
        } else {
            (None, None)
        };

        let profile = video::build_video_profile(self.config, accel, size, duration);
        self.logger.info(&profile.log_message);

        let result = self.run_video_profile(input, temp, &profile, filename);

        // The capability probe is advisory; a hardware encoder that turns
        // out not to work gets one software retry.
        match result {
            Err(EncodeError::Failed { .. }) | Err(EncodeError::Terminated { .. })
                if profile.using_hardware =>
            {
                self.logger.warn(&format!(
                    "Hardware encode failed for {}, retrying with software encoder",
                    filename
                ));
                if temp.exists() {
                    let _ = fs::remove_file(temp);
                }

                let software = AccelerationInfo {
                    available: false,
                    message: "hardware encode failed".to_string(),
                };
                let sw_profile = video::build_video_profile(self.config, &software, None, None);
                self.logger.info(&sw_profile.log_message);
                self.run_video_profile(input, temp, &sw_profile, filename)
            }
            other => other,
        }
    }

    fn run_video_profile(
        &self,
        input: &Path,
        temp: &Path,
        profile: &video::VideoProfile,
        filename: &str,
    ) -> Result<(), EncodeError> {
        video::run_video_encode(
            &self.ffmpeg.program,
            input,
            temp,
            profile,
            self.config.video_timeout(),
            |update| {
                let eta = update
                    .eta
                    .map(format_duration)
                    .unwrap_or_else(|| "--:--".to_string());
                self.logger.info(&format!(
                    "   {}: [{}] {:.1}% ({:.1}x, ETA: {})",
                    filename,
                    progress_bar(update.percent, 30),
                    update.percent,
                    update.speed,
                    eta
                ));
            },
        )
    }

    /// Guarded delete of the original after a verified publish. The output
    /// is re-stat'd and must clear a minimum size floor; otherwise the
    /// original stays and the run continues.
    fn safe_delete(&self, input: &Path, output: &Path, filename: &str) {
        let output_ok = fs::metadata(output)
            .map(|m| m.len() >= 1000)
            .unwrap_or(false);

        if !output_ok {
            self.logger.warn(&format!(
                "Deletion cancelled for safety: {} (output below minimum size)",
                filename
            ));
            return;
        }

        match fs::remove_file(input) {
            Ok(()) => self.logger.security(&format!("Safe deletion: {}", filename)),
            Err(err) => self.logger.warn(&format!(
                "Failed to delete original {}: {}",
                filename, err
            )),
        }
    }
}
