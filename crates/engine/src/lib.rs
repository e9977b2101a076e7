//! mediapress conversion engine
//!
//! Walks a source tree, converts photos and videos into modern codecs by
//! driving external encoder binaries, and publishes results into a
//! date-organized destination tree with crash-safe, idempotent semantics.

pub mod classify;
pub mod coordinator;
pub mod dates;
pub mod encode;
pub mod limiter;
pub mod logger;
pub mod marker;
pub mod monitor;
pub mod pipeline;
pub mod plan;
pub mod pool;
pub mod probes;
pub mod recovery;
pub mod stats;
pub mod tools;
pub mod verify;

pub use mediapress_config as config;
pub use mediapress_config::{AdaptiveWorkersConfig, Config, PhotoFormat, VideoCodec};

pub use classify::{discover_sources, MediaKind, SourceInventory};
pub use coordinator::{Coordinator, RunError};
pub use dates::{resolve_capture_date, DateError};
pub use encode::{EncodeError, ProgressUpdate};
pub use limiter::AdaptiveLimiter;
pub use logger::Logger;
pub use marker::{claim_marker, marker_path, release_marker};
pub use monitor::{ResourceMonitor, ResourceSnapshot};
pub use pipeline::{Pipeline, PipelineError};
pub use stats::{RunStats, StatsSnapshot};
pub use verify::{Verifier, VerifyError};
