//! # Processing Pipeline
//!
//! This module turns raw footage into activity clips. Frames stream out of
//! an ffmpeg child process, get scored for motion and objects, accumulate
//! into spans, and the kept spans are re-encoded as clips.
//!
//! ```text
//! Video File → Frame Stream → Motion/Objects → Spans → Clips
//!      │            │               │            │        │
//!   ffprobe     rawvideo       MotionWindow,  Segment   ffmpeg
//!   metadata    gray pipe      Detector       Builder   re-encode
//! ```
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`FrameStream`] | Grayscale analysis frames from an ffmpeg pipe |
//! | [`VideoJob`] | Scans one video and extracts its clips |
//! | [`FolderRun`] | Works through a footage folder with parallel jobs |
//! | [`ProgressSink`] | Where progress events go (log, channel, tests) |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`frames`] | Raw frame codec and the decoder child process |
//! | [`video`] | The per-video scan loop |
//! | [`progress`] | Progress events and sinks |
//! | [`folder`] | Folder orchestration, journaling, cancellation |

pub mod folder;
pub mod frames;
pub mod progress;
pub mod video;

pub use folder::{
    discover_videos, list_subfolders, run_folders, CancelFlag, FolderRun, FolderSummary,
    PipelineRunner, VideoRunner,
};
pub use frames::{FrameStream, RawFrameCodec};
pub use progress::{
    ChannelSink, CompositeSink, InMemorySink, NoopSink, ProgressEvent, ProgressSink, TracingSink,
};
pub use video::{VideoJob, VideoOutcome};

/// Pipeline error types
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Probe failed for {path}: {reason}")]
    Probe { path: String, reason: String },

    #[error("Decode failed for {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Clip extraction failed for {path}: {reason}")]
    Extract { path: String, reason: String },

    #[error("Detector error: {0}")]
    Detector(#[from] crate::detect::DetectError),

    #[error("Scan canceled")]
    Cancelled,

    #[error(transparent)]
    Tool(#[from] crate::tools::ToolError),

    #[error("Internal error: {0}")]
    Internal(String),
}
