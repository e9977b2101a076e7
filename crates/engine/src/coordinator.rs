//! Top-level run orchestration.
//!
//! Fixed order: banner info → recovery → disk-space precheck → safety
//! probe → discovery → photo pass → video pass → final report. Failures
//! before discovery abort the run; everything after is per-file.

use crate::classify::{self, MediaKind};
use crate::logger::Logger;
use crate::pipeline::{Pipeline, PipelineError};
use crate::pool;
use crate::probes::{self, ProbeError};
use crate::recovery;
use crate::stats::{format_duration, RunStats, StatsSnapshot};
use crate::verify::Verifier;
use mediapress_config::Config;
use std::fs;
use std::sync::Arc;
use thiserror::Error;

/// AWS S3 Standard storage price used for the informational cost estimate,
/// in dollars per GB per month.
const S3_DOLLARS_PER_GB_MONTH: f64 = 0.023;

/// Error type for run-level failures (everything before discovery)
#[derive(Debug, Error)]
pub enum RunError {
    #[error("insufficient disk space! Available: {available} bytes, estimated needed: {needed} bytes")]
    DiskSpace { available: u64, needed: u64 },

    #[error("disk space check failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("safety test failed: {0}")]
    SafetyTest(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives one full conversion run.
pub struct Coordinator {
    config: Config,
    logger: Arc<Logger>,
    /// Encoder binary overrides (tests substitute stub scripts)
    programs: Option<(String, String)>,
    /// Verifier probe overrides (tests substitute `true`/`false`)
    probe_commands: Option<(String, String)>,
}

impl Coordinator {
    pub fn new(config: Config, logger: Arc<Logger>) -> Self {
        Self {
            config,
            logger,
            programs: None,
            probe_commands: None,
        }
    }

    /// Substitute the encoder binaries for every pipeline this run creates.
    pub fn with_programs(mut self, magick: &str, ffmpeg: &str) -> Self {
        self.programs = Some((magick.to_string(), ffmpeg.to_string()));
        self
    }

    /// Substitute the verifier's decoder-parse binaries.
    pub fn with_probe_commands(mut self, magick: &str, ffprobe: &str) -> Self {
        self.probe_commands = Some((magick.to_string(), ffprobe.to_string()));
        self
    }

    /// Execute the run. Returns the final statistics snapshot; per-file
    /// failures are inside it, not in the error channel.
    pub fn run(&self) -> Result<StatsSnapshot, RunError> {
        let config = &self.config;
        let logger = &self.logger;
        let stats = RunStats::new();
        let mut verifier = Verifier::from_config(config);
        if let Some((magick, ffprobe)) = &self.probe_commands {
            verifier = verifier.with_probe_commands(magick, ffprobe);
        }
        let mut pipeline = Pipeline::new(config, logger, &stats, &verifier);
        if let Some((magick, ffmpeg)) = &self.programs {
            pipeline = pipeline.with_programs(magick, ffmpeg);
        }

        logger.log("Starting secure media conversion");
        logger.info(&format!("Source: {}", config.source_dir.display()));
        logger.info(&format!("Destination: {}", config.dest_dir.display()));
        if let Some(message) = pipeline.ffmpeg_message() {
            logger.info(message);
        }
        if config.dry_run {
            logger.info("DRY RUN MODE - No files will be converted");
        }
        logger.info(&format!("Keep originals: {}", config.keep_originals));
        println!();

        recovery::perform_recovery(&config.dest_dir, &verifier, logger, &stats);

        self.check_disk_space()?;
        logger.success("Disk space check passed");

        if !config.dry_run {
            self.run_safety_test(&pipeline)?;
        }

        let inventory = classify::discover_sources(&config.source_dir, config, logger);
        stats.set_total_files(inventory.total() as u64);
        logger.info(&format!("📸 Photos found: {}", inventory.photos.len()));
        logger.info(&format!("🎬 Videos found: {}", inventory.videos.len()));
        logger.info(&format!("📁 Total files: {}", inventory.total()));
        println!();

        for path in inventory.photos.iter().chain(inventory.videos.iter()) {
            if let Ok(metadata) = fs::metadata(path) {
                stats.add_total_size_mb(metadata.len() as f64 / (1024.0 * 1024.0));
            }
        }

        if !inventory.photos.is_empty() {
            logger.log("Converting photos...");
            pool::run_pass(
                &inventory.photos,
                MediaKind::Photo,
                &pipeline,
                config,
                logger,
                &stats,
            );
        }

        if !inventory.videos.is_empty() {
            println!();
            logger.log("Converting videos...");
            pool::run_pass(
                &inventory.videos,
                MediaKind::Video,
                &pipeline,
                config,
                logger,
                &stats,
            );
        }

        self.show_final_report(&stats);
        Ok(stats.snapshot())
    }

    /// Require free space at the destination of at least half the source
    /// tree's size.
    fn check_disk_space(&self) -> Result<(), RunError> {
        let source_size = probes::dir_size(&self.config.source_dir);
        let available = probes::available_space(&self.config.dest_dir)?;
        let needed = source_size / 2;

        if available < needed {
            return Err(RunError::DiskSpace { available, needed });
        }
        Ok(())
    }

    /// Encode one small photo into a scratch directory to prove the whole
    /// path works before touching the archive. The scratch directory is
    /// removed afterwards whatever the result.
    fn run_safety_test(&self, pipeline: &Pipeline) -> Result<(), RunError> {
        let logger = &self.logger;
        logger.info("Running safety test...");

        let test_file = match classify::find_safety_test_file(&self.config.source_dir, &self.config)
        {
            Some(path) => path,
            None => {
                logger.warn("No test file found, skipping safety test");
                return Ok(());
            }
        };

        let test_dir = self.config.dest_dir.join(".safety_test");
        fs::create_dir_all(&test_dir)?;

        let result = (|| -> Result<(), RunError> {
            let file_name = test_file.file_name().expect("source files have names");
            let test_copy = test_dir.join(file_name);
            fs::copy(&test_file, &test_copy)?;

            logger.info(&format!(
                "Testing conversion on: {}",
                file_name.to_string_lossy()
            ));

            // Originals forced kept, no date tree, scratch destination.
            pipeline.convert_into(&test_copy, MediaKind::Photo, &test_dir, false, true)?;
            Ok(())
        })();

        let _ = fs::remove_dir_all(&test_dir);
        result?;

        logger.success("Safety test passed ✅");
        Ok(())
    }

    fn show_final_report(&self, stats: &RunStats) {
        let logger = &self.logger;
        let snap = stats.snapshot();

        println!();
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║                 Conversion Complete                          ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();

        logger.success(&format!(
            "✅ Files processed: {}/{}",
            snap.processed, snap.total_files
        ));

        if snap.skipped > 0 {
            logger.info(&format!(
                "⏭️  Files skipped (already exist): {}",
                snap.skipped
            ));
        }
        if snap.recovered > 0 {
            logger.info(&format!(
                "🔄 Files recovered from corruption: {}",
                snap.recovered
            ));
        }
        if snap.cleaned > 0 {
            logger.info(&format!("🧹 Abandoned files cleaned: {}", snap.cleaned));
        }
        if snap.verified > 0 {
            logger.info(&format!(
                "🔍 Files verified for integrity: {}",
                snap.verified
            ));
        }
        if snap.failed > 0 {
            logger.warn(&format!("⚠️  Failed conversions: {}", snap.failed));
        }

        logger.info(&format!(
            "⏱️  Total time: {}",
            format_duration(stats.elapsed())
        ));

        if snap.processed_size_mb > 0.0 {
            let reduction_percent = snap.saved_size_mb / snap.processed_size_mb * 100.0;

            logger.info(&format!("📊 Original size: {:.1} MB", snap.processed_size_mb));
            logger.info(&format!("📦 Compressed size: {:.1} MB", snap.output_size_mb));
            logger.success(&format!(
                "💾 Space saved: {:.1} MB ({:.1}% reduction)",
                snap.saved_size_mb, reduction_percent
            ));

            if snap.saved_size_mb > 0.0 {
                let monthly_savings = snap.saved_size_mb / 1024.0 * S3_DOLLARS_PER_GB_MONTH;
                let yearly_savings = monthly_savings * 12.0;
                logger.success(&format!(
                    "💰 Estimated S3 savings: ${:.2}/month (${:.2}/year)",
                    monthly_savings, yearly_savings
                ));

                let monthly_storage = snap.output_size_mb / 1024.0 * S3_DOLLARS_PER_GB_MONTH;
                logger.info(&format!(
                    "☁️  Total S3 storage cost: ${:.2}/month (${:.2}/year)",
                    monthly_storage,
                    monthly_storage * 12.0
                ));
            }
        }

        println!();
        logger.info(&format!(
            "📁 Converted files in: {}",
            self.config.dest_dir.display()
        ));
        logger.info(&format!(
            "📄 Detailed logs: {}/conversion.log",
            self.config.dest_dir.display()
        ));

        if self.config.keep_originals {
            logger.success("🔒 Original files have been preserved");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn fake_photo_encoder(dir: &Path) -> PathBuf {
        let script = dir.join("fake-magick.sh");
        let body = "#!/bin/sh\nfor last in \"$@\"; do :; done\nout=${last#*:}\nhead -c 5000 /dev/zero > \"$out\"\n";
        fs::write(&script, body).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    struct Fixture {
        _dirs: TempDir,
        source: PathBuf,
        dest: PathBuf,
        config: Config,
    }

    fn fixture() -> Fixture {
        let dirs = TempDir::new().unwrap();
        let source = dirs.path().join("source");
        let dest = dirs.path().join("dest");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();

        let mut config = Config::default();
        config.source_dir = source.clone();
        config.dest_dir = dest.clone();
        config.max_jobs = 2;
        Fixture {
            _dirs: dirs,
            source,
            dest,
            config,
        }
    }

    fn coordinator(fixture: &Fixture, magick: &Path) -> Coordinator {
        Coordinator::new(fixture.config.clone(), Arc::new(Logger::console_only()))
            .with_programs(magick.to_str().unwrap(), "ffmpeg")
            .with_probe_commands("true", "true")
    }

    #[test]
    fn test_dry_run_reports_discovery_counts() {
        let mut fx = fixture();
        fx.config.dry_run = true;
        fs::write(fx.source.join("a.jpg"), vec![0u8; 100]).unwrap();
        fs::write(fx.source.join("b.heic"), vec![0u8; 100]).unwrap();
        fs::write(fx.source.join("skip.txt"), vec![0u8; 100]).unwrap();

        let snap = coordinator(&fx, Path::new("magick")).run().unwrap();

        assert_eq!(snap.total_files, 2);
        assert_eq!(snap.processed, 2);
        assert_eq!(snap.failed, 0);
    }

    // Running twice produces the same destination state, and the second
    // run's skip count equals the first run's processed count.
    #[test]
    fn test_idempotent_reruns() {
        let fx = fixture();
        fs::write(fx.source.join("a.jpg"), vec![0u8; 100]).unwrap();
        fs::write(fx.source.join("b.jpg"), vec![0u8; 100]).unwrap();
        let encoder = fake_photo_encoder(&fx.source);

        let first = coordinator(&fx, &encoder).run().unwrap();
        assert_eq!(first.failed, 0);
        assert_eq!(first.processed, 2);

        let published = |dest: &Path| -> Vec<PathBuf> {
            let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dest)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().map(|x| x == "avif").unwrap_or(false))
                .map(|e| e.path().to_path_buf())
                .collect();
            files.sort();
            files
        };

        let after_first = published(&fx.dest);
        assert_eq!(after_first.len(), 2);

        let second = coordinator(&fx, &encoder).run().unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, first.processed);
        assert_eq!(published(&fx.dest), after_first);
    }

    #[test]
    fn test_safety_test_scratch_dir_removed() {
        let fx = fixture();
        fs::write(fx.source.join("a.jpg"), vec![0u8; 100]).unwrap();
        let encoder = fake_photo_encoder(&fx.source);

        let _ = coordinator(&fx, &encoder).run();

        assert!(
            !fx.dest.join(".safety_test").exists(),
            "scratch directory must not outlive the run"
        );
    }

    #[test]
    fn test_empty_source_completes_cleanly() {
        let fx = fixture();
        let snap = coordinator(&fx, Path::new("magick")).run().unwrap();
        assert_eq!(snap.total_files, 0);
        assert_eq!(snap.processed, 0);
    }
}
