//! Encoder adapter.
//!
//! Builds and runs the external encoder invocations: `magick` for photos,
//! `ffmpeg` for videos (with streaming progress parsed off stderr). Every
//! invocation runs under a deadline; expiry kills the child process.

pub mod photo;
pub mod progress;
pub mod video;

pub use photo::{build_photo_command, run_photo_encode};
pub use progress::{ProgressParser, ProgressUpdate};
pub use video::{build_video_command, build_video_profile, run_video_encode, VideoProfile};

use std::time::Duration;
use thiserror::Error;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder exited with non-zero status; carries the stderr tail
    #[error("encoder failed with exit code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    /// Encoder was terminated by a signal
    #[error("encoder terminated by signal: {stderr}")]
    Terminated { stderr: String },

    /// Deadline expired and the child was killed
    #[error("encode timed out after {0:?}")]
    Timeout(Duration),

    /// IO error spawning or waiting for the encoder
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keep only the last few lines of captured stderr so a failure report has
/// context without dragging megabytes of encoder chatter along.
pub(crate) const STDERR_TAIL_LINES: usize = 50;
