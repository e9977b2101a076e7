//! Run-wide statistics
//!
//! Monotonic counters and size aggregates for a single conversion run.
//! All mutation goes through one mutex so concurrent workers never race.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub total_files: u64,
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub recovered: u64,
    pub cleaned: u64,
    pub verified: u64,
    /// Size of every discovered input, in MB
    pub total_size_mb: f64,
    /// Size of inputs actually converted, in MB
    pub processed_size_mb: f64,
    /// Size of published outputs, in MB
    pub output_size_mb: f64,
    /// processed - output, in MB
    pub saved_size_mb: f64,
}

#[derive(Default)]
struct Counters {
    total_files: u64,
    processed: u64,
    failed: u64,
    skipped: u64,
    recovered: u64,
    cleaned: u64,
    verified: u64,
    total_size_mb: f64,
    processed_size_mb: f64,
    output_size_mb: f64,
    saved_size_mb: f64,
}

/// Shared statistics for one run
pub struct RunStats {
    inner: Mutex<Counters>,
    start: Instant,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters::default()),
            start: Instant::now(),
        }
    }

    pub fn set_total_files(&self, count: u64) {
        self.inner.lock().unwrap().total_files = count;
    }

    pub fn add_total_size_mb(&self, mb: f64) {
        self.inner.lock().unwrap().total_size_mb += mb;
    }

    /// Record a successful conversion. Returns the new processed count so
    /// callers can drive the overall progress cadence.
    pub fn file_processed(&self) -> u64 {
        let mut c = self.inner.lock().unwrap();
        c.processed += 1;
        c.processed
    }

    pub fn file_failed(&self) {
        self.inner.lock().unwrap().failed += 1;
    }

    pub fn file_skipped(&self) {
        self.inner.lock().unwrap().skipped += 1;
    }

    pub fn file_recovered(&self) {
        self.inner.lock().unwrap().recovered += 1;
    }

    pub fn file_cleaned(&self) {
        self.inner.lock().unwrap().cleaned += 1;
    }

    pub fn file_verified(&self) {
        self.inner.lock().unwrap().verified += 1;
    }

    /// Record input/output sizes for a published file
    pub fn add_size_stats(&self, input_mb: f64, output_mb: f64) {
        let mut c = self.inner.lock().unwrap();
        c.processed_size_mb += input_mb;
        c.output_size_mb += output_mb;
        c.saved_size_mb += input_mb - output_mb;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = self.inner.lock().unwrap();
        StatsSnapshot {
            total_files: c.total_files,
            processed: c.processed,
            failed: c.failed,
            skipped: c.skipped,
            recovered: c.recovered,
            cleaned: c.cleaned,
            verified: c.verified,
            total_size_mb: c.total_size_mb,
            processed_size_mb: c.processed_size_mb,
            output_size_mb: c.output_size_mb,
            saved_size_mb: c.saved_size_mb,
        }
    }

    /// Wall time since the run started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Format a duration the way the progress lines do: `42s`, `3m12s`, `1h04m`.
pub fn format_duration(d: Duration) -> String {
    let total_seconds = d.as_secs();
    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    if minutes < 60 {
        return format!("{}m{}s", minutes, seconds);
    }

    let hours = minutes / 60;
    format!("{}h{:02}m", hours, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = RunStats::new();
        let snap = stats.snapshot();
        assert_eq!(snap, StatsSnapshot::default());
    }

    #[test]
    fn test_processed_returns_running_count() {
        let stats = RunStats::new();
        assert_eq!(stats.file_processed(), 1);
        assert_eq!(stats.file_processed(), 2);
        assert_eq!(stats.file_processed(), 3);
    }

    #[test]
    fn test_size_stats_accumulate() {
        let stats = RunStats::new();
        stats.add_size_stats(100.0, 40.0);
        stats.add_size_stats(50.0, 10.0);

        let snap = stats.snapshot();
        assert!((snap.processed_size_mb - 150.0).abs() < 1e-9);
        assert!((snap.output_size_mb - 50.0).abs() < 1e-9);
        assert!((snap.saved_size_mb - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(RunStats::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.file_processed();
                    stats.file_verified();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.processed, 800);
        assert_eq!(snap.verified, 800);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(192)), "3m12s");
        assert_eq!(format_duration(Duration::from_secs(3840)), "1h04m");
    }
}
