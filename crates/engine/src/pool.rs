//! Per-kind worker pools.
//!
//! Photos run under the global job ceiling. Videos get their own track:
//! capped at two workers by default to protect the machine, or gated by
//! the adaptive limiter when enabled. Work is distributed over one channel
//! per kind; there is no stealing across kinds.

use crate::classify::MediaKind;
use crate::limiter::AdaptiveLimiter;
use crate::logger::{progress_bar, Logger};
use crate::monitor::{run_adaptive_controller, ResourceMonitor};
use crate::pipeline::{Outcome, Pipeline};
use crate::stats::{format_duration, RunStats};
use crossbeam_channel::{unbounded, Receiver};
use mediapress_config::Config;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Convert a batch of same-kind files with a fixed set of workers.
///
/// Per-file failures are logged and counted, never propagated; a pass
/// always drains its queue.
pub fn run_pass(
    files: &[PathBuf],
    kind: MediaKind,
    pipeline: &Pipeline,
    config: &Config,
    logger: &Arc<Logger>,
    stats: &RunStats,
) {
    if files.is_empty() {
        return;
    }

    let mut workers = config.max_jobs.max(1);
    let mut limiter: Option<AdaptiveLimiter> = None;
    let stop = Arc::new(AtomicBool::new(false));
    let mut snapshots = None;

    if kind == MediaKind::Video {
        let aw = &config.adaptive_workers;
        if aw.enabled {
            workers = aw.max.max(aw.min).max(1);
            let initial = aw.min.clamp(1, workers);
            limiter = Some(AdaptiveLimiter::new(initial));

            let monitor = ResourceMonitor::new(aw.interval());
            let (rx, _monitor_handle) = monitor.start(stop.clone(), logger.clone());
            snapshots = Some(rx);
        } else {
            if workers > 2 {
                workers = 2;
            }
            logger.info(&format!(
                "📹 Video conversion limited to {} simultaneous jobs for CPU protection",
                workers
            ));
        }
    }

    let (tx, rx) = unbounded::<PathBuf>();

    std::thread::scope(|scope| {
        if let (Some(lim), Some(snaps)) = (limiter.as_ref(), snapshots.take()) {
            let aw = &config.adaptive_workers;
            let controller_logger: &Logger = logger;
            scope.spawn(move || run_adaptive_controller(lim, aw, snaps, controller_logger));
        }

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let rx = rx.clone();
                let limiter = limiter.as_ref();
                scope.spawn(move || {
                    worker_loop(rx, kind, pipeline, limiter, logger, stats);
                })
            })
            .collect();
        drop(rx);

        for file in files {
            // Send fails only if every worker already died; nothing to do then.
            if tx.send(file.clone()).is_err() {
                break;
            }
        }
        drop(tx);

        for handle in handles {
            let _ = handle.join();
        }

        // Workers are done; stopping the monitor closes the snapshot
        // channel, which ends the controller. The scope then joins it.
        stop.store(true, Ordering::Relaxed);
    });
}

fn worker_loop(
    jobs: Receiver<PathBuf>,
    kind: MediaKind,
    pipeline: &Pipeline,
    limiter: Option<&AdaptiveLimiter>,
    logger: &Logger,
    stats: &RunStats,
) {
    for path in jobs.iter() {
        if let Some(lim) = limiter {
            lim.acquire();
        }

        let result = pipeline.convert_file(&path, kind);

        if let Some(lim) = limiter {
            lim.release();
        }

        match result {
            Ok(Outcome::Published) | Ok(Outcome::DryRun) => {
                let processed = stats.file_processed();
                if processed % 10 == 0 {
                    show_overall_progress(stats, logger);
                }
            }
            Ok(Outcome::Skipped) => {}
            Err(err) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                logger.error(&format!("Failed to convert {}: {}", name, err));
                stats.file_failed();
            }
        }
    }
}

/// Coarse overall progress line, emitted every ten completed files.
fn show_overall_progress(stats: &RunStats, logger: &Logger) {
    let snap = stats.snapshot();
    if snap.total_files == 0 {
        return;
    }

    let percent = snap.processed as f64 / snap.total_files as f64 * 100.0;
    let eta = if snap.processed > 0 {
        let per_file = stats.elapsed().div_f64(snap.processed as f64);
        let remaining = per_file.mul_f64(snap.total_files.saturating_sub(snap.processed) as f64);
        format!("ETA: {}", format_duration(remaining))
    } else {
        "ETA: --:--".to_string()
    };

    logger.info(&format!(
        "📈 Progress: [{}] {}/{} ({:.1}%) | {}",
        progress_bar(percent, 25),
        snap.processed,
        snap.total_files,
        percent,
        eta
    ));
}
