//! Object detection behind a pluggable backend trait.
//!
//! The pipeline only ever talks to [`Detector`]. The default backend shells
//! out to an external detector process speaking newline-delimited JSON; the
//! null backend turns object gating off entirely.

mod command;
mod schema;

pub use command::{CommandDetector, DETECT_TIMEOUT_SECS};
pub use schema::{detector_wire_schema, WireReply, WireRequest};

use async_trait::async_trait;
use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Failed to start detector '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("Failed to encode frame for detector: {reason}")]
    Encode { reason: String },

    #[error("Detector protocol error: {reason}")]
    Protocol { reason: String },

    #[error("Detector did not answer within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Detector process exited: {detail}")]
    Exited { detail: String },
}

/// One detected box on an analysis frame. Coordinates are pixels on the
/// resized frame, `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn area(&self) -> f64 {
        let [x1, y1, x2, y2] = self.bbox;
        ((x2 - x1).max(0.0) as f64) * ((y2 - y1).max(0.0) as f64)
    }
}

/// A single grayscale frame, one byte per pixel, row major.
#[derive(Debug, Clone)]
pub struct FramePixels {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl FramePixels {
    pub fn new(width: u32, height: u32, data: Bytes) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy out a rectangular region, clamped to the frame bounds.
    pub fn crop(&self, roi: [u32; 4]) -> FramePixels {
        let [x1, y1, x2, y2] = roi;
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        let x2 = x2.clamp(x1, self.width);
        let y2 = y2.clamp(y1, self.height);
        let w = (x2 - x1) as usize;
        let h = (y2 - y1) as usize;

        let mut out = Vec::with_capacity(w * h);
        let stride = self.width as usize;
        for row in y1 as usize..y2 as usize {
            let start = row * stride + x1 as usize;
            out.extend_from_slice(&self.data[start..start + w]);
        }
        FramePixels::new(x2 - x1, y2 - y1, Bytes::from(out))
    }
}

/// Backend that finds objects in analysis frames.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detect objects in a frame.
    async fn detect(&self, frame: &FramePixels) -> Result<Vec<Detection>, DetectError>;

    /// Get backend name for logging.
    fn name(&self) -> &'static str;
}

/// Detector that never sees anything. Used when no detector command is
/// configured, which leaves motion as the only gate.
pub struct NullDetector;

#[async_trait]
impl Detector for NullDetector {
    async fn detect(&self, _frame: &FramePixels) -> Result<Vec<Detection>, DetectError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Admission rules applied to raw detections, in order: class membership,
/// confidence, box area.
#[derive(Debug, Clone)]
pub struct DetectionFilter {
    target_classes: HashSet<u32>,
    confidence: f32,
    min_area: f64,
}

impl DetectionFilter {
    /// `source_width`/`source_height` are the dimensions of the original
    /// stream, not the resized analysis frame. The area floor has always
    /// been computed against the source dimensions even though boxes are
    /// reported on the resized frame, and downstream thresholds are tuned
    /// for that behavior.
    pub fn new(
        config: &crate::config::ProcessingConfig,
        source_width: u32,
        source_height: u32,
    ) -> Self {
        Self {
            target_classes: config.target_classes.iter().copied().collect(),
            confidence: config.confidence,
            min_area: config.min_object_area_ratio * source_width as f64 * source_height as f64,
        }
    }

    pub fn admits(&self, detection: &Detection) -> bool {
        if !self.target_classes.contains(&detection.class_id) {
            return false;
        }
        if detection.confidence < self.confidence {
            return false;
        }
        detection.area() >= self.min_area
    }

    /// First detection that passes all rules, if any.
    pub fn first_admitted<'a>(&self, detections: &'a [Detection]) -> Option<&'a Detection> {
        detections.iter().find(|d| self.admits(d))
    }
}
