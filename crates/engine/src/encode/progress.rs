//! Streaming progress parsing for video encodes.
//!
//! ffmpeg reports progress on stderr; a dedicated scanner thread parses it
//! line by line and forwards throttled updates to the owning task, keeping
//! a bounded tail of raw lines for error reporting.

use super::STDERR_TAIL_LINES;
use crossbeam_channel::Sender;
use regex::Regex;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// A throttled progress event forwarded to the owning task.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    /// Completion percentage in [0, 100]
    pub percent: f64,
    /// Encode speed relative to realtime (1.0 = realtime)
    pub speed: f64,
    /// Estimated time remaining, when computable
    pub eta: Option<Duration>,
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2}\.\d{2})").expect("static regex"))
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=(\d{2}):(\d{2}):(\d{2}\.\d{2})").expect("static regex"))
}

fn speed_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"speed=\s*([0-9.]+)x").expect("static regex"))
}

/// Incremental parser over ffmpeg's stderr stream.
///
/// The first `Duration:` line fixes the total; `time=` and `speed=` update
/// the current position.
#[derive(Debug)]
pub struct ProgressParser {
    total_seconds: f64,
    current_seconds: f64,
    speed: f64,
    started: Instant,
    saw_end: bool,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            total_seconds: 0.0,
            current_seconds: 0.0,
            speed: 0.0,
            started: Instant::now(),
            saw_end: false,
        }
    }

    fn hms_to_seconds(h: &str, m: &str, s: &str) -> Option<f64> {
        let hours: f64 = h.parse().ok()?;
        let minutes: f64 = m.parse().ok()?;
        let seconds: f64 = s.parse().ok()?;
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }

    /// Feed one stderr line into the parser.
    pub fn parse_line(&mut self, line: &str) {
        if self.total_seconds == 0.0 {
            if let Some(caps) = duration_regex().captures(line) {
                if let Some(total) = Self::hms_to_seconds(&caps[1], &caps[2], &caps[3]) {
                    self.total_seconds = total;
                }
            }
        }

        if let Some(caps) = time_regex().captures(line) {
            if let Some(current) = Self::hms_to_seconds(&caps[1], &caps[2], &caps[3]) {
                self.current_seconds = current;
            }
        }

        if let Some(caps) = speed_regex().captures(line) {
            if let Ok(speed) = caps[1].parse::<f64>() {
                self.speed = speed;
            }
        }

        if line.contains("progress=end") {
            self.saw_end = true;
        }
    }

    /// Completion percentage, or None before the total duration is known.
    pub fn percent(&self) -> Option<f64> {
        if self.total_seconds <= 0.0 {
            return None;
        }
        Some((self.current_seconds / self.total_seconds * 100.0).min(100.0))
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn saw_end(&self) -> bool {
        self.saw_end
    }

    /// Wall-clock estimate of remaining time, available once the encode is
    /// far enough along to extrapolate (speed known, > 5% done).
    pub fn eta(&self) -> Option<Duration> {
        let percent = self.percent()?;
        if self.speed <= 0.0 || percent <= 5.0 {
            return None;
        }
        let elapsed = self.started.elapsed();
        let total_estimated = elapsed.div_f64(percent / 100.0);
        total_estimated.checked_sub(elapsed)
    }

    fn update(&self) -> Option<ProgressUpdate> {
        Some(ProgressUpdate {
            percent: self.percent()?,
            speed: self.speed,
            eta: self.eta(),
        })
    }
}

/// Result of draining an encoder's stderr to completion.
#[derive(Debug)]
pub struct StderrScan {
    /// Last lines of raw stderr, newline-joined
    pub tail: String,
    /// Whether ffmpeg reported `progress=end`
    pub saw_end: bool,
}

/// Consume an encoder's stderr on the calling thread.
///
/// Parsed progress is forwarded through `updates` at most once per
/// `throttle` (drop-on-full, so a slow consumer cannot stall the encoder),
/// and the bounded tail of raw lines is returned for error context.
pub fn scan_stderr<R: Read>(
    reader: R,
    updates: Sender<ProgressUpdate>,
    throttle: Duration,
) -> StderrScan {
    let mut parser = ProgressParser::new();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut last_update = Instant::now();

    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        parser.parse_line(&line);

        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);

        if last_update.elapsed() >= throttle {
            if let Some(update) = parser.update() {
                let _ = updates.try_send(update);
                last_update = Instant::now();
            }
        }
    }

    if parser.saw_end {
        if let Some(update) = parser.update() {
            let _ = updates.try_send(update);
        }
    }

    StderrScan {
        tail: tail.into_iter().collect::<Vec<_>>().join("\n"),
        saw_end: parser.saw_end,
    }
}
