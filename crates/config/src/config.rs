//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// YAML parsing error
    Parse(serde_yaml::Error),
    /// Source directory missing or not a directory
    BadSource(PathBuf),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::BadSource(p) => {
                write!(f, "Source directory does not exist: {}", p.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Output format for photo conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhotoFormat {
    #[default]
    Avif,
    Webp,
}

impl PhotoFormat {
    /// File extension used for published photo outputs
    pub fn extension(&self) -> &'static str {
        match self {
            PhotoFormat::Avif => "avif",
            PhotoFormat::Webp => "webp",
        }
    }
}

impl std::fmt::Display for PhotoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for PhotoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "avif" => Ok(PhotoFormat::Avif),
            "webp" => Ok(PhotoFormat::Webp),
            other => Err(format!("unknown photo format: {}", other)),
        }
    }
}

/// Target video codec. Unrecognized names normalize to H.265, matching the
/// permissive handling of hand-edited config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H265,
    H264,
    Av1,
}

impl VideoCodec {
    /// Normalize a codec name, accepting common aliases.
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "h264" | "avc" | "h.264" => VideoCodec::H264,
            "av1" => VideoCodec::Av1,
            _ => VideoCodec::H265,
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::H265 => f.write_str("h265"),
            VideoCodec::H264 => f.write_str("h264"),
            VideoCodec::Av1 => f.write_str("av1"),
        }
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(VideoCodec::normalize(s))
    }
}

impl<'de> Deserialize<'de> for VideoCodec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(VideoCodec::normalize(&raw))
    }
}

/// Adaptive video-worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveWorkersConfig {
    /// Enable runtime scaling of video concurrency (default false)
    #[serde(default)]
    pub enabled: bool,
    /// Lower bound on concurrent video conversions
    #[serde(default = "default_adaptive_min")]
    pub min: usize,
    /// Upper bound on concurrent video conversions
    #[serde(default = "default_adaptive_max")]
    pub max: usize,
    /// CPU percentage at or above which the system counts as busy
    #[serde(default = "default_cpu_high")]
    pub cpu_high: f64,
    /// CPU percentage at or below which scaling up may be considered
    #[serde(default = "default_cpu_low")]
    pub cpu_low: f64,
    /// Available-memory percentage at or below which the system counts as busy
    #[serde(default = "default_mem_low_percent")]
    pub mem_low_percent: f64,
    /// Sampling interval in seconds
    #[serde(default = "default_adaptive_interval")]
    pub interval_seconds: u64,
}

fn default_adaptive_min() -> usize {
    1
}

fn default_adaptive_max() -> usize {
    6
}

fn default_cpu_high() -> f64 {
    80.0
}

fn default_cpu_low() -> f64 {
    50.0
}

fn default_mem_low_percent() -> f64 {
    20.0
}

fn default_adaptive_interval() -> u64 {
    3
}

impl Default for AdaptiveWorkersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min: default_adaptive_min(),
            max: default_adaptive_max(),
            cpu_high: default_cpu_high(),
            cpu_low: default_cpu_low(),
            mem_low_percent: default_mem_low_percent(),
            interval_seconds: default_adaptive_interval(),
        }
    }
}

impl AdaptiveWorkersConfig {
    /// Sampling interval as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Source tree to convert (positional argument, never read from file)
    #[serde(skip)]
    pub source_dir: PathBuf,
    /// Destination root (positional argument, never read from file)
    #[serde(skip)]
    pub dest_dir: PathBuf,

    /// Total worker ceiling (default: cores - 2, clamped to [1, cores])
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
    /// Plan only, run no encoder
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub photo_format: PhotoFormat,
    #[serde(default = "default_photo_quality_avif")]
    pub photo_quality_avif: u32,
    #[serde(default = "default_photo_quality_webp")]
    pub photo_quality_webp: u32,

    #[serde(default)]
    pub video_codec: VideoCodec,
    #[serde(default = "default_video_crf")]
    pub video_crf: i32,
    /// Allow the hardware encode path when the platform provides one
    #[serde(default = "default_true")]
    pub video_acceleration: bool,

    #[serde(default = "default_true")]
    pub organize_by_date: bool,
    #[serde(default = "default_true")]
    pub keep_originals: bool,
    /// Language for month names in the destination tree (en, fr, es, de)
    #[serde(default = "default_language")]
    pub language: String,

    /// Photo encode timeout in seconds
    #[serde(default = "default_timeout_photo")]
    pub timeout_photo: u64,
    /// Video encode timeout in seconds
    #[serde(default = "default_timeout_video")]
    pub timeout_video: u64,

    #[serde(default = "default_min_output_size_ratio")]
    pub min_output_size_ratio: f64,
    #[serde(default = "default_min_output_size_ratio_avif")]
    pub min_output_size_ratio_avif: f64,
    #[serde(default = "default_min_output_size_ratio_webp")]
    pub min_output_size_ratio_webp: f64,

    /// Extensions recognized as photos (lowercase, no leading dot)
    #[serde(default = "default_photo_extensions")]
    pub photo_extensions: Vec<String>,
    /// Extensions recognized as videos (lowercase, no leading dot)
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    #[serde(default)]
    pub adaptive_workers: AdaptiveWorkersConfig,
}

fn default_true() -> bool {
    true
}

fn default_max_jobs() -> usize {
    let cores = num_cpus::get();
    cores.saturating_sub(2).clamp(1, cores)
}

fn default_photo_quality_avif() -> u32 {
    80
}

fn default_photo_quality_webp() -> u32 {
    85
}

fn default_video_crf() -> i32 {
    28
}

fn default_language() -> String {
    "en".to_string()
}

fn default_timeout_photo() -> u64 {
    300
}

fn default_timeout_video() -> u64 {
    1800
}

fn default_min_output_size_ratio() -> f64 {
    0.005
}

fn default_min_output_size_ratio_avif() -> f64 {
    0.001
}

fn default_min_output_size_ratio_webp() -> f64 {
    0.003
}

fn default_photo_extensions() -> Vec<String> {
    [
        "jpg", "jpeg", "heic", "heif", "cr2", "arw", "nef", "dng", "tiff", "tif", "png", "raw",
        "bmp", "gif", "webp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_video_extensions() -> Vec<String> {
    [
        "mov", "mp4", "avi", "mkv", "m4v", "mts", "m2ts", "mpg", "mpeg", "wmv", "flv", "3gp",
        "3gpp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::new(),
            dest_dir: PathBuf::new(),
            max_jobs: default_max_jobs(),
            dry_run: false,
            photo_format: PhotoFormat::default(),
            photo_quality_avif: default_photo_quality_avif(),
            photo_quality_webp: default_photo_quality_webp(),
            video_codec: VideoCodec::default(),
            video_crf: default_video_crf(),
            video_acceleration: true,
            organize_by_date: true,
            keep_originals: true,
            language: default_language(),
            timeout_photo: default_timeout_photo(),
            timeout_video: default_timeout_video(),
            min_output_size_ratio: default_min_output_size_ratio(),
            min_output_size_ratio_avif: default_min_output_size_ratio_avif(),
            min_output_size_ratio_webp: default_min_output_size_ratio_webp(),
            photo_extensions: default_photo_extensions(),
            video_extensions: default_video_extensions(),
            adaptive_workers: AdaptiveWorkersConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// Missing optional fields fall back to defaults. A missing file is not
    /// an error; the caller decides whether a config file is required.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Default config file location: `$HOME/.mediapress.yaml`
    pub fn default_file_path() -> Option<PathBuf> {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".mediapress.yaml"))
    }

    /// Load from an explicit file, or the default location, or defaults when
    /// no file exists. Environment overrides are applied afterwards.
    pub fn load(explicit_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit_file {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_file_path() {
                Some(path) if path.is_file() => Self::load_from_file(path)?,
                _ => Config::default(),
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Recognized variables (all prefixed MEDIAPRESS_):
    /// DRY_RUN, KEEP_ORIGINALS, MAX_JOBS, PHOTO_FORMAT, PHOTO_QUALITY_AVIF,
    /// PHOTO_QUALITY_WEBP, VIDEO_CODEC, VIDEO_CRF, VIDEO_ACCELERATION,
    /// ORGANIZE_BY_DATE, LANGUAGE, TIMEOUT_PHOTO, TIMEOUT_VIDEO,
    /// MIN_OUTPUT_SIZE_RATIO
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool("MEDIAPRESS_DRY_RUN") {
            self.dry_run = v;
        }
        if let Some(v) = env_bool("MEDIAPRESS_KEEP_ORIGINALS") {
            self.keep_originals = v;
        }
        if let Ok(val) = env::var("MEDIAPRESS_MAX_JOBS") {
            if let Ok(jobs) = val.parse::<usize>() {
                self.max_jobs = jobs;
            }
        }
        if let Ok(val) = env::var("MEDIAPRESS_PHOTO_FORMAT") {
            if let Ok(format) = val.parse::<PhotoFormat>() {
                self.photo_format = format;
            }
        }
        if let Ok(val) = env::var("MEDIAPRESS_PHOTO_QUALITY_AVIF") {
            if let Ok(q) = val.parse::<u32>() {
                self.photo_quality_avif = q;
            }
        }
        if let Ok(val) = env::var("MEDIAPRESS_PHOTO_QUALITY_WEBP") {
            if let Ok(q) = val.parse::<u32>() {
                self.photo_quality_webp = q;
            }
        }
        if let Ok(val) = env::var("MEDIAPRESS_VIDEO_CODEC") {
            self.video_codec = VideoCodec::normalize(&val);
        }
        if let Ok(val) = env::var("MEDIAPRESS_VIDEO_CRF") {
            if let Ok(crf) = val.parse::<i32>() {
                self.video_crf = crf;
            }
        }
        if let Some(v) = env_bool("MEDIAPRESS_VIDEO_ACCELERATION") {
            self.video_acceleration = v;
        }
        if let Some(v) = env_bool("MEDIAPRESS_ORGANIZE_BY_DATE") {
            self.organize_by_date = v;
        }
        if let Ok(val) = env::var("MEDIAPRESS_LANGUAGE") {
            self.language = val;
        }
        if let Ok(val) = env::var("MEDIAPRESS_TIMEOUT_PHOTO") {
            if let Ok(secs) = val.parse::<u64>() {
                self.timeout_photo = secs;
            }
        }
        if let Ok(val) = env::var("MEDIAPRESS_TIMEOUT_VIDEO") {
            if let Ok(secs) = val.parse::<u64>() {
                self.timeout_video = secs;
            }
        }
        if let Ok(val) = env::var("MEDIAPRESS_MIN_OUTPUT_SIZE_RATIO") {
            if let Ok(ratio) = val.parse::<f64>() {
                self.min_output_size_ratio = ratio;
            }
        }
    }

    /// Clamp and repair values that individual sources may have left out of
    /// range. Called once after all merge layers (file, env, flags).
    pub fn sanitize(&mut self) {
        let cores = num_cpus::get();
        if self.max_jobs < 1 {
            self.max_jobs = 1;
        }
        if self.max_jobs > cores {
            self.max_jobs = cores;
        }

        self.photo_quality_avif = self.photo_quality_avif.clamp(1, 100);
        self.photo_quality_webp = self.photo_quality_webp.clamp(1, 100);

        // A ratio of zero or less means "use the format default".
        if self.min_output_size_ratio <= 0.0 {
            self.min_output_size_ratio = default_min_output_size_ratio();
        }
        if self.min_output_size_ratio_avif <= 0.0 {
            self.min_output_size_ratio_avif = default_min_output_size_ratio_avif();
        }
        if self.min_output_size_ratio_webp <= 0.0 {
            self.min_output_size_ratio_webp = default_min_output_size_ratio_webp();
        }

        self.language = self.language.to_lowercase();
        if !matches!(self.language.as_str(), "en" | "fr" | "es" | "de") {
            self.language = default_language();
        }

        let aw = &mut self.adaptive_workers;
        if aw.min < 1 {
            aw.min = 1;
        }
        if aw.max < aw.min {
            aw.max = aw.min;
        }
        if aw.interval_seconds == 0 {
            aw.interval_seconds = default_adaptive_interval();
        }
        // The adaptive pool never exceeds the global job ceiling.
        if aw.max > self.max_jobs {
            aw.max = self.max_jobs;
        }
        if aw.min > aw.max {
            aw.min = aw.max;
        }
        if aw.cpu_high <= 0.0 {
            aw.cpu_high = default_cpu_high();
        }
        if aw.cpu_low <= 0.0 || aw.cpu_low >= aw.cpu_high {
            aw.cpu_low = aw.cpu_high * 0.6;
        }
        if aw.mem_low_percent <= 0.0 {
            aw.mem_low_percent = default_mem_low_percent();
        }
    }

    /// Photo encode timeout as a Duration
    pub fn photo_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_photo)
    }

    /// Video encode timeout as a Duration
    pub fn video_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_video)
    }

    /// Quality value for the configured photo format
    pub fn photo_quality(&self) -> u32 {
        match self.photo_format {
            PhotoFormat::Avif => self.photo_quality_avif,
            PhotoFormat::Webp => self.photo_quality_webp,
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    match env::var(name).ok()?.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        for name in [
            "MEDIAPRESS_DRY_RUN",
            "MEDIAPRESS_KEEP_ORIGINALS",
            "MEDIAPRESS_MAX_JOBS",
            "MEDIAPRESS_PHOTO_FORMAT",
            "MEDIAPRESS_PHOTO_QUALITY_AVIF",
            "MEDIAPRESS_PHOTO_QUALITY_WEBP",
            "MEDIAPRESS_VIDEO_CODEC",
            "MEDIAPRESS_VIDEO_CRF",
            "MEDIAPRESS_VIDEO_ACCELERATION",
            "MEDIAPRESS_ORGANIZE_BY_DATE",
            "MEDIAPRESS_LANGUAGE",
            "MEDIAPRESS_TIMEOUT_PHOTO",
            "MEDIAPRESS_TIMEOUT_VIDEO",
            "MEDIAPRESS_MIN_OUTPUT_SIZE_RATIO",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_yaml("").expect("Empty YAML should parse");

        assert!(!config.dry_run);
        assert!(config.keep_originals);
        assert_eq!(config.photo_format, PhotoFormat::Avif);
        assert_eq!(config.photo_quality_avif, 80);
        assert_eq!(config.photo_quality_webp, 85);
        assert_eq!(config.video_codec, VideoCodec::H265);
        assert_eq!(config.video_crf, 28);
        assert!(config.video_acceleration);
        assert!(config.organize_by_date);
        assert_eq!(config.language, "en");
        assert_eq!(config.timeout_photo, 300);
        assert_eq!(config.timeout_video, 1800);
        assert!((config.min_output_size_ratio - 0.005).abs() < 1e-9);
        assert!((config.min_output_size_ratio_avif - 0.001).abs() < 1e-9);
        assert!((config.min_output_size_ratio_webp - 0.003).abs() < 1e-9);
        assert!(!config.adaptive_workers.enabled);
        assert_eq!(config.adaptive_workers.min, 1);
        assert_eq!(config.adaptive_workers.max, 6);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let yaml = r#"
photo_format: webp
video_crf: 23
adaptive_workers:
  enabled: true
  max: 4
"#;
        let config = Config::parse_yaml(yaml).expect("Partial YAML should parse");

        assert_eq!(config.photo_format, PhotoFormat::Webp);
        assert_eq!(config.video_crf, 23);
        assert!(config.adaptive_workers.enabled);
        assert_eq!(config.adaptive_workers.max, 4);
        // Untouched fields keep defaults
        assert_eq!(config.adaptive_workers.min, 1);
        assert!(config.keep_originals);
        assert_eq!(config.timeout_video, 1800);
    }

    #[test]
    fn test_codec_aliases_normalize() {
        assert_eq!(VideoCodec::normalize("hevc"), VideoCodec::H265);
        assert_eq!(VideoCodec::normalize("H.265"), VideoCodec::H265);
        assert_eq!(VideoCodec::normalize("AVC"), VideoCodec::H264);
        assert_eq!(VideoCodec::normalize("av1"), VideoCodec::Av1);
        assert_eq!(VideoCodec::normalize("mpeg2"), VideoCodec::H265);
    }

    #[test]
    fn test_codec_deserializes_from_alias() {
        let config = Config::parse_yaml("video_codec: hevc\n").unwrap();
        assert_eq!(config.video_codec, VideoCodec::H265);
    }

    #[test]
    fn test_extension_sets_defaults() {
        let config = Config::default();
        assert!(config.photo_extensions.iter().any(|e| e == "heic"));
        assert!(config.photo_extensions.iter().any(|e| e == "cr2"));
        assert_eq!(config.photo_extensions.len(), 15);
        assert!(config.video_extensions.iter().any(|e| e == "m2ts"));
        assert_eq!(config.video_extensions.len(), 13);
    }

    #[test]
    fn test_sanitize_reverts_nonpositive_ratios() {
        let mut config = Config::default();
        config.min_output_size_ratio = 0.0;
        config.min_output_size_ratio_avif = -1.0;
        config.min_output_size_ratio_webp = 0.0;
        config.sanitize();

        assert!((config.min_output_size_ratio - 0.005).abs() < 1e-9);
        assert!((config.min_output_size_ratio_avif - 0.001).abs() < 1e-9);
        assert!((config.min_output_size_ratio_webp - 0.003).abs() < 1e-9);
    }

    #[test]
    fn test_sanitize_clamps_adaptive_bounds() {
        let mut config = Config::default();
        config.max_jobs = 4;
        config.adaptive_workers.min = 0;
        config.adaptive_workers.max = 99;
        config.adaptive_workers.cpu_high = 0.0;
        config.adaptive_workers.cpu_low = 200.0;
        config.adaptive_workers.mem_low_percent = -5.0;
        config.adaptive_workers.interval_seconds = 0;
        config.sanitize();

        assert_eq!(config.adaptive_workers.min, 1);
        assert_eq!(config.adaptive_workers.max, config.max_jobs); // global ceiling wins
        assert!((config.adaptive_workers.cpu_high - 80.0).abs() < 1e-9);
        assert!((config.adaptive_workers.cpu_low - 48.0).abs() < 1e-9);
        assert!((config.adaptive_workers.mem_low_percent - 20.0).abs() < 1e-9);
        assert_eq!(config.adaptive_workers.interval_seconds, 3);
    }

    #[test]
    fn test_sanitize_unknown_language_falls_back_to_english() {
        let mut config = Config::default();
        config.language = "Klingon".to_string();
        config.sanitize();
        assert_eq!(config.language, "en");

        config.language = "FR".to_string();
        config.sanitize();
        assert_eq!(config.language, "fr");
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("MEDIAPRESS_DRY_RUN", "true");
        env::set_var("MEDIAPRESS_MAX_JOBS", "3");
        env::set_var("MEDIAPRESS_PHOTO_FORMAT", "webp");
        env::set_var("MEDIAPRESS_VIDEO_CODEC", "av1");
        env::set_var("MEDIAPRESS_TIMEOUT_VIDEO", "60");
        config.apply_env_overrides();
        clear_env_vars();

        assert!(config.dry_run);
        assert_eq!(config.max_jobs, 3);
        assert_eq!(config.photo_format, PhotoFormat::Webp);
        assert_eq!(config.video_codec, VideoCodec::Av1);
        assert_eq!(config.timeout_video, 60);
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        let before_jobs = config.max_jobs;
        env::set_var("MEDIAPRESS_MAX_JOBS", "lots");
        env::set_var("MEDIAPRESS_DRY_RUN", "maybe");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.max_jobs, before_jobs);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "keep_originals: false\nlanguage: de\n").unwrap();

        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();
        let config = Config::load(Some(&path)).unwrap();

        assert!(!config.keep_originals);
        assert_eq!(config.language, "de");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_sanitize_bounds_max_jobs(raw_jobs in 0usize..4096) {
            let mut config = Config::default();
            config.max_jobs = raw_jobs;
            config.sanitize();

            let cores = num_cpus::get();
            prop_assert!(config.max_jobs >= 1);
            prop_assert!(config.max_jobs <= cores);
        }

        #[test]
        fn prop_sanitize_adaptive_invariants(
            min in 0usize..32,
            max in 0usize..32,
            cpu_high in -10.0f64..200.0,
            cpu_low in -10.0f64..200.0,
        ) {
            let mut config = Config::default();
            config.adaptive_workers.min = min;
            config.adaptive_workers.max = max;
            config.adaptive_workers.cpu_high = cpu_high;
            config.adaptive_workers.cpu_low = cpu_low;
            config.sanitize();

            let aw = &config.adaptive_workers;
            prop_assert!(aw.min >= 1);
            prop_assert!(aw.max >= aw.min);
            prop_assert!(aw.max <= config.max_jobs);
            prop_assert!(aw.cpu_high > 0.0);
            prop_assert!(aw.cpu_low > 0.0);
            prop_assert!(aw.cpu_low < aw.cpu_high);
        }

        #[test]
        fn prop_quality_clamped(avif_q in 0u32..400, webp_q in 0u32..400) {
            let mut config = Config::default();
            config.photo_quality_avif = avif_q;
            config.photo_quality_webp = webp_q;
            config.sanitize();

            prop_assert!((1..=100).contains(&config.photo_quality_avif));
            prop_assert!((1..=100).contains(&config.photo_quality_webp));
        }

        #[test]
        fn prop_config_yaml_round_trip(
            dry_run in proptest::bool::ANY,
            keep in proptest::bool::ANY,
            crf in 0i32..64,
            quality in 1u32..100,
            timeout in 1u64..7200,
        ) {
            let mut config = Config::default();
            config.dry_run = dry_run;
            config.keep_originals = keep;
            config.video_crf = crf;
            config.photo_quality_avif = quality;
            config.timeout_video = timeout;

            let yaml = serde_yaml::to_string(&config).expect("serialize");
            let parsed = Config::parse_yaml(&yaml).expect("parse back");

            prop_assert_eq!(config, parsed);
        }
    }
}
