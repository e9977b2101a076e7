//! CLI entry point for mediapress
//!
//! Parses arguments, merges configuration (defaults < file < environment <
//! flags), and hands the run to the coordinator. Exit code 0 means the run
//! completed, even with per-file failures; nonzero is reserved for pre-run
//! validation and catastrophic I/O.

use clap::Parser;
use mediapress_config::{Config, PhotoFormat, VideoCodec};
use mediapress_engine::{tools, Coordinator, Logger};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Secure parallel media converter for images and videos
///
/// Converts photos to modern formats (AVIF, WebP) and videos to efficient
/// codecs (H.265, H.264, AV1) with built-in safety checks and date-based
/// file organization.
#[derive(Parser, Debug)]
#[command(name = "mediapress")]
#[command(author, version, about)]
struct Args {
    /// Directory tree to convert
    source: PathBuf,

    /// Destination root (created if absent)
    destination: PathBuf,

    /// Config file (default: $HOME/.mediapress.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show what would be converted without actually converting
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Keep original files after conversion
    #[arg(short, long)]
    keep_originals: Option<bool>,

    /// Number of parallel jobs (default: CPU cores - 2)
    #[arg(short = 'j', long = "jobs")]
    max_jobs: Option<usize>,

    /// Output format for photos (avif, webp)
    #[arg(long)]
    photo_format: Option<PhotoFormat>,

    /// Quality for AVIF images (1-100)
    #[arg(long)]
    photo_quality_avif: Option<u32>,

    /// Quality for WebP images (1-100)
    #[arg(long)]
    photo_quality_webp: Option<u32>,

    /// Video codec (h265, h264, av1)
    #[arg(long)]
    video_codec: Option<VideoCodec>,

    /// Video CRF value (lower = better quality)
    #[arg(long)]
    video_crf: Option<i32>,

    /// Allow hardware-accelerated video encoding
    #[arg(long)]
    video_acceleration: Option<bool>,

    /// Organize files by capture date
    #[arg(short, long)]
    organize_by_date: Option<bool>,

    /// Language for month names (en, fr, es, de)
    #[arg(long)]
    language: Option<String>,

    /// Timeout for photo conversion in seconds
    #[arg(long)]
    timeout_photo: Option<u64>,

    /// Timeout for video conversion in seconds
    #[arg(long)]
    timeout_video: Option<u64>,

    /// Minimum output size ratio (0.0 uses format-specific defaults)
    #[arg(long)]
    min_output_ratio: Option<f64>,

    /// Log swallowed traversal errors and other diagnostics
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Apply flag overrides on top of the file/env-merged configuration.
    fn apply_to(&self, config: &mut Config) {
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(keep) = self.keep_originals {
            config.keep_originals = keep;
        }
        if let Some(jobs) = self.max_jobs {
            config.max_jobs = jobs;
        }
        if let Some(format) = self.photo_format {
            config.photo_format = format;
        }
        if let Some(quality) = self.photo_quality_avif {
            config.photo_quality_avif = quality;
        }
        if let Some(quality) = self.photo_quality_webp {
            config.photo_quality_webp = quality;
        }
        if let Some(codec) = self.video_codec {
            config.video_codec = codec;
        }
        if let Some(crf) = self.video_crf {
            config.video_crf = crf;
        }
        if let Some(accel) = self.video_acceleration {
            config.video_acceleration = accel;
        }
        if let Some(organize) = self.organize_by_date {
            config.organize_by_date = organize;
        }
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if let Some(secs) = self.timeout_photo {
            config.timeout_photo = secs;
        }
        if let Some(secs) = self.timeout_video {
            config.timeout_video = secs;
        }
        if let Some(ratio) = self.min_output_ratio {
            config.min_output_size_ratio = ratio;
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let mut config =
        Config::load(args.config.as_deref()).map_err(|e| format!("configuration: {}", e))?;
    args.apply_to(&mut config);
    config.source_dir = args.source.clone();
    config.dest_dir = args.destination.clone();
    config.sanitize();

    if !config.source_dir.is_dir() {
        return Err(format!(
            "source directory does not exist: {}",
            config.source_dir.display()
        ));
    }

    std::fs::create_dir_all(&config.dest_dir)
        .map_err(|e| format!("failed to create destination directory: {}", e))?;

    let log_path = config.dest_dir.join("conversion.log");
    let logger = Logger::new(Some(&log_path), args.verbose)
        .map_err(|e| format!("failed to initialize logger: {}", e))?;
    let logger = Arc::new(logger);

    if !config.dry_run {
        tools::check_dependencies().map_err(|e| format!("dependency check failed: {}", e))?;
    }

    logger.show_header(config.keep_originals);

    let coordinator = Coordinator::new(config, logger);
    coordinator
        .run()
        .map_err(|e| format!("conversion failed: {}", e))?;

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}
