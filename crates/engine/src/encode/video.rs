//! Video encoding through ffmpeg.
//!
//! Builds an encoding profile from the configured codec (falling back from
//! hardware to software H.265 when the platform offers nothing better),
//! assembles the ffmpeg invocation, and runs it under a deadline with
//! streaming progress updates.

use super::progress::{scan_stderr, ProgressUpdate, StderrScan};
use super::EncodeError;
use crate::tools::AccelerationInfo;
use crossbeam_channel::bounded;
use mediapress_config::{Config, VideoCodec};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// How a single video will be encoded.
#[derive(Debug, Clone)]
pub struct VideoProfile {
    pub codec: &'static str,
    pub args: Vec<String>,
    pub hwaccel_args: Vec<String>,
    pub output_tag: Option<&'static str>,
    pub using_hardware: bool,
    pub log_message: String,
}

fn clamp_crf(value: i32, min: i32, max: i32) -> i32 {
    value.clamp(min, max)
}

/// Target and buffer bitrates for the hardware encoder, derived from the
/// source bitrate: `max(2.5 Mbps, 0.65 x source)`, buffer at twice the
/// target. Unknown size or duration falls back to 4 Mbps.
pub fn estimate_hardware_bitrate(
    size_bytes: Option<u64>,
    duration: Option<Duration>,
) -> (String, String) {
    const FALLBACK_MBPS: f64 = 4.0;

    let fallback = (
        format!("{:.2}M", FALLBACK_MBPS),
        format!("{:.2}M", FALLBACK_MBPS * 2.0),
    );

    let (size, duration) = match (size_bytes, duration) {
        (Some(size), Some(d)) if !d.is_zero() => (size, d),
        _ => return fallback,
    };

    let mbps = (size as f64 * 8.0) / duration.as_secs_f64() / 1_000_000.0;
    if mbps <= 0.0 {
        return fallback;
    }

    let target = (mbps * 0.65).max(2.5);
    let buffer = (target * 2.0).max(target + 1.0);
    (format!("{:.2}M", target), format!("{:.2}M", buffer))
}

/// Source duration in seconds, read through ffprobe.
pub fn video_duration(path: &Path) -> Option<Duration> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let value = raw.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("n/a") {
        return None;
    }

    let seconds: f64 = value.parse().ok()?;
    if seconds <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(seconds))
}

/// Build the encoding profile for one source file.
pub fn build_video_profile(
    config: &Config,
    accel: &AccelerationInfo,
    source_size: Option<u64>,
    source_duration: Option<Duration>,
) -> VideoProfile {
    match config.video_codec {
        VideoCodec::H264 => {
            let crf = clamp_crf(config.video_crf, 18, 30);
            VideoProfile {
                codec: "libx264",
                args: vec![
                    "-crf".into(),
                    crf.to_string(),
                    "-preset".into(),
                    "medium".into(),
                ],
                hwaccel_args: Vec::new(),
                output_tag: None,
                using_hardware: false,
                log_message: format!(
                    "📹 Using software encoding: libx264 (CRF {}, preset medium)",
                    crf
                ),
            }
        }
        VideoCodec::Av1 => {
            let crf = clamp_crf(config.video_crf, 28, 45);
            VideoProfile {
                codec: "libaom-av1",
                args: vec![
                    "-crf".into(),
                    crf.to_string(),
                    "-b:v".into(),
                    "0".into(),
                    "-cpu-used".into(),
                    "4".into(),
                ],
                hwaccel_args: Vec::new(),
                output_tag: None,
                using_hardware: false,
                log_message: format!("📹 Using software encoding: libaom-av1 (CRF {})", crf),
            }
        }
        VideoCodec::H265 => {
            if accel.available && config.video_acceleration {
                let (bitrate, bufsize) = estimate_hardware_bitrate(source_size, source_duration);
                VideoProfile {
                    codec: "hevc_videotoolbox",
                    args: vec![
                        "-b:v".into(),
                        bitrate.clone(),
                        "-maxrate".into(),
                        bitrate.clone(),
                        "-bufsize".into(),
                        bufsize,
                    ],
                    hwaccel_args: vec!["-hwaccel".into(), "videotoolbox".into()],
                    output_tag: Some("hvc1"),
                    using_hardware: true,
                    log_message: format!(
                        "📹 Using hardware acceleration: {} (target bitrate {})",
                        accel.message, bitrate
                    ),
                }
            } else {
                let crf = clamp_crf(config.video_crf, 18, 32);
                VideoProfile {
                    codec: "libx265",
                    args: vec![
                        "-crf".into(),
                        crf.to_string(),
                        "-preset".into(),
                        "medium".into(),
                    ],
                    hwaccel_args: Vec::new(),
                    output_tag: None,
                    using_hardware: false,
                    log_message: format!(
                        "📹 Using software encoding: libx265 (CRF {}, preset medium)",
                        crf
                    ),
                }
            }
        }
    }
}

/// Assemble the full ffmpeg invocation for one video.
///
/// Always: AAC audio at 128 kbps, faststart MP4, metadata copied from the
/// source, the container forced to MP4 regardless of the temp suffix, and
/// progress reporting onto stderr.
pub fn build_video_command(
    program: &str,
    input: &Path,
    temp_output: &Path,
    profile: &VideoProfile,
) -> Command {
    let mut cmd = Command::new(program);

    for arg in &profile.hwaccel_args {
        cmd.arg(arg);
    }

    cmd.arg("-i").arg(input);
    cmd.arg("-c:v").arg(profile.codec);

    for arg in &profile.args {
        cmd.arg(arg);
    }

    if let Some(tag) = profile.output_tag {
        cmd.arg("-tag:v").arg(tag);
    }

    cmd.arg("-c:a")
        .arg("aac")
        .arg("-b:a")
        .arg("128k")
        .arg("-movflags")
        .arg("+faststart")
        .arg("-map_metadata")
        .arg("0")
        .arg("-f")
        .arg("mp4")
        .arg("-progress")
        .arg("pipe:2")
        .arg("-y")
        .arg(temp_output);

    cmd
}

/// Interval between progress reports per task.
const PROGRESS_THROTTLE: Duration = Duration::from_secs(30);

/// Run a video encode under a deadline, reporting throttled progress.
///
/// Stderr is consumed on a dedicated scanner thread that feeds parsed
/// events back over a bounded channel; this thread polls the child and
/// drains those events while it waits. Deadline expiry kills the child.
pub fn run_video_encode(
    program: &str,
    input: &Path,
    temp_output: &Path,
    profile: &VideoProfile,
    timeout: Duration,
    mut on_progress: impl FnMut(ProgressUpdate),
) -> Result<(), EncodeError> {
    let mut cmd = build_video_command(program, input, temp_output, profile);
    cmd.stdout(Stdio::null()).stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let stderr = child.stderr.take().expect("stderr was piped");

    let (tx, rx) = bounded::<ProgressUpdate>(8);
    let scanner =
        std::thread::spawn(move || -> StderrScan { scan_stderr(stderr, tx, PROGRESS_THROTTLE) });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }

        while let Ok(update) = rx.try_recv() {
            on_progress(update);
        }

        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            let _ = scanner.join();
            return Err(EncodeError::Timeout(timeout));
        }

        std::thread::sleep(Duration::from_millis(100));
    };

    let scan = scanner
        .join()
        .unwrap_or_else(|_| StderrScan {
            tail: String::new(),
            saw_end: false,
        });

    while let Ok(update) = rx.try_recv() {
        on_progress(update);
    }

    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(EncodeError::Failed {
                code,
                stderr: scan.tail,
            }),
            None => Err(EncodeError::Terminated { stderr: scan.tail }),
        }
    }
}
