//! Resource monitoring and the adaptive concurrency controller.
//!
//! A sampler thread publishes CPU/memory snapshots on a single-slot
//! channel with drop-newest semantics; the controller consumes them and
//! nudges the video limiter up or down inside the configured bounds.

use crate::limiter::AdaptiveLimiter;
use crate::logger::Logger;
use crossbeam_channel::{bounded, Receiver};
use mediapress_config::AdaptiveWorkersConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use sysinfo::System;

/// A single polling result for system utilization.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub mem_available_percent: f64,
    pub cpu_measured: bool,
    pub mem_measured: bool,
}

/// Periodically samples CPU and memory pressure.
///
/// CPU utilization is approximated as `load1 / cores * 100`; memory as the
/// percentage of total memory still available. A field that cannot be read
/// is warned about at most once so a broken probe does not spam the log.
pub struct ResourceMonitor {
    interval: Duration,
}

impl ResourceMonitor {
    pub fn new(interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_secs(3)
        } else {
            interval
        };
        Self { interval }
    }

    /// Spawn the sampler thread. Snapshots arrive on the returned channel;
    /// when the consumer lags, the newest sample is dropped rather than
    /// queued. The thread exits once `stop` is set, closing the channel.
    pub fn start(
        self,
        stop: Arc<AtomicBool>,
        logger: Arc<Logger>,
    ) -> (Receiver<ResourceSnapshot>, JoinHandle<()>) {
        let (tx, rx) = bounded::<ResourceSnapshot>(1);

        let handle = std::thread::spawn(move || {
            let cores = num_cpus::get() as f64;
            let mut system = System::new();
            let mut warned_cpu = false;
            let mut warned_mem = false;

            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(self.interval);
                if stop.load(Ordering::Relaxed) {
                    break;
                }

                let mut snapshot = ResourceSnapshot::default();

                match sample_cpu_percent(cores) {
                    Some(cpu) => {
                        snapshot.cpu_percent = cpu;
                        snapshot.cpu_measured = true;
                    }
                    None if !warned_cpu => {
                        warned_cpu = true;
                        logger.warn("Adaptive workers: CPU metrics unavailable");
                    }
                    None => {}
                }

                match sample_memory_available_percent(&mut system) {
                    Some(mem) => {
                        snapshot.mem_available_percent = mem;
                        snapshot.mem_measured = true;
                    }
                    None if !warned_mem => {
                        warned_mem = true;
                        logger.warn("Adaptive workers: memory metrics unavailable");
                    }
                    None => {}
                }

                // Drop the sample if the consumer is behind.
                let _ = tx.try_send(snapshot);
            }
        });

        (rx, handle)
    }
}

fn sample_cpu_percent(cores: f64) -> Option<f64> {
    let load = System::load_average().one;
    if !load.is_finite() || load < 0.0 || cores <= 0.0 {
        return None;
    }
    Some(load / cores * 100.0)
}

fn sample_memory_available_percent(system: &mut System) -> Option<f64> {
    system.refresh_memory();
    let total = system.total_memory();
    if total == 0 {
        return None;
    }
    Some(system.available_memory() as f64 / total as f64 * 100.0)
}

/// Drive the limiter from a snapshot stream until the stream closes.
///
/// One busy sample is enough to scale down; two consecutive comfortable
/// samples are required to scale up; any in-between sample resets both
/// streaks. The limit never leaves `[cfg.min, cfg.max]`.
pub fn run_adaptive_controller(
    limiter: &AdaptiveLimiter,
    cfg: &AdaptiveWorkersConfig,
    snapshots: Receiver<ResourceSnapshot>,
    logger: &Logger,
) {
    if cfg.max < 1 {
        return;
    }

    let comfort_mem_threshold = (cfg.mem_low_percent + 5.0).min(100.0);
    let mut high_streak = 0u32;
    let mut low_streak = 0u32;

    logger.info(&format!(
        "Adaptive workers enabled: starting with {} concurrent video conversions (min={}, max={})",
        limiter.limit(),
        cfg.min,
        cfg.max
    ));

    for snap in snapshots.iter() {
        let busy = (snap.cpu_measured && snap.cpu_percent >= cfg.cpu_high)
            || (snap.mem_measured && snap.mem_available_percent <= cfg.mem_low_percent);

        if busy {
            high_streak += 1;
            low_streak = 0;
            let limit = limiter.limit();
            if high_streak >= 1 && limit > cfg.min {
                let new_limit = limit - 1;
                limiter.set_limit(new_limit);
                logger.warn(&format!(
                    "Adaptive workers: reducing video concurrency to {} (CPU {:.1}%, free memory {:.1}%)",
                    new_limit, snap.cpu_percent, snap.mem_available_percent
                ));
            }
            continue;
        }

        let comfortable = (!snap.cpu_measured || snap.cpu_percent <= cfg.cpu_low)
            && (!snap.mem_measured || snap.mem_available_percent >= comfort_mem_threshold);

        if !comfortable {
            high_streak = 0;
            low_streak = 0;
            continue;
        }

        low_streak += 1;
        if low_streak < 2 {
            continue;
        }

        high_streak = 0;
        low_streak = 0;
        let limit = limiter.limit();
        if limit < cfg.max {
            let new_limit = limit + 1;
            limiter.set_limit(new_limit);
            logger.info(&format!(
                "Adaptive workers: increasing video concurrency to {} (CPU {:.1}%, free memory {:.1}%)",
                new_limit, snap.cpu_percent, snap.mem_available_percent
            ));
        }
    }
}
