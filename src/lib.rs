//! # clipsieve
//!
//! Motion and object gated clip extraction for folders of camera footage.
//!
//! ## Overview
//!
//! This library scans folders of recorded footage, finds the stretches where
//! something actually happens, and cuts them out as standalone clips. Frames
//! are decoded through ffmpeg, scored for motion against the previous frame,
//! and optionally confirmed by an external object detector; active stretches
//! become padded, merged segments that ffmpeg then extracts. A per-folder
//! journal records every video's outcome so interrupted runs resume where
//! they stopped.
//!
//! ## Core Philosophy
//!
//! - **Process-Based**: decoding, probing, detection and extraction ride on
//!   child processes (ffmpeg, ffprobe, a detector command), never on
//!   in-process codecs
//! - **Journal-First**: outcomes land in a per-folder journal as they happen,
//!   so a rerun skips finished work and retries failures
//! - **Stream-Oriented**: frames flow through an async decoder stream and are
//!   dropped as soon as they are scored
//! - **Type-Safe**: strongly typed configuration, events and per-subsystem
//!   error types
//!
//! ## Key Features
//!
//! - **Folder Runs**: [`pipeline::run_folders`] works through footage folders
//!   on a bounded worker pool
//! - **Motion Gating**: frame differencing with a rolling window via the
//!   [`motion`] module
//! - **Object Gating**: a detector child process speaking JSON lines via
//!   [`detect::CommandDetector`]
//! - **Clip Extraction**: padded, merged segments cut with ffmpeg via the
//!   [`extract`] module
//! - **Weights Resolution**: search roots, cache and an optional HTTP mirror
//!   via the [`weights`] module
//! - **Interactive Console**: a line-oriented front end in the [`console`]
//!   module, started through the [`launch`] shim
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clipsieve::config::{ProcessingConfig, RunPaths};
//! use clipsieve::pipeline::{run_folders, CancelFlag, NoopSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> clipsieve::Result<()> {
//!     let config = ProcessingConfig::default()
//!         .with_detector_command("python3 detect.py");
//!     let paths = RunPaths::default();
//!
//!     let summaries =
//!         run_folders(&config, &paths, None, Arc::new(NoopSink), CancelFlag::new()).await?;
//!     for summary in summaries {
//!         println!("{}: {} clips", summary.folder, summary.clips_total);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | Folder orchestration, frame streaming, per-video scans |
//! | [`motion`] | Frame differencing and the rolling motion window |
//! | [`detect`] | Detector processes, wire schema, detection filtering |
//! | [`segment`] | Active spans: padding, extension, merging |
//! | [`extract`] | Clip naming and ffmpeg extraction |
//! | [`journal`] | Per-folder processing journal |
//! | [`probe`] | Stream metadata via ffprobe |
//! | [`weights`] | Model weights resolution and mirror downloads |
//! | [`config`] | Processing tunables, loading, validation |
//! | [`console`] | Interactive console front end |
//! | [`launch`] | Startup shim for the packaged binaries |
//! | [`entry`] | Named entry point registry |
//! | [`session`] | Interactive session detection |
//! | [`observe`] | Logging setup and the recent-events ring |
//! | [`tools`] | ffmpeg/ffprobe discovery |
//! | [`memory`] | System memory readings for pressure warnings |

pub mod config;
pub mod console;
pub mod detect;
pub mod entry;
pub mod extract;
pub mod journal;
pub mod launch;
pub mod memory;
pub mod motion;
pub mod observe;
pub mod pipeline;
pub mod probe;
pub mod segment;
pub mod session;
pub mod tools;
pub mod weights;

// Re-export main types for convenience
pub use config::{ProcessingConfig, RunPaths};
pub use detect::{Detection, Detector, NullDetector};
pub use launch::LaunchOptions;
pub use pipeline::{
    run_folders, CancelFlag, FolderSummary, ProgressEvent, ProgressSink, VideoOutcome,
};
pub use weights::fetch_weights;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
