//! Processing configuration: defaults, file loading, and validation.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunables for a processing run. Field defaults match the values the batch
/// CLI ships with; the console and CLI override individual fields on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Minimum detector confidence for a box to count.
    pub confidence: f32,
    /// Seconds of footage kept before and after activity.
    pub buffer_seconds: f64,
    /// Minimum object area as a ratio of the frame area.
    pub min_object_area_ratio: f64,
    /// Detector class ids a box must belong to before it gates a segment.
    pub target_classes: Vec<u32>,
    /// Region of interest on the analysis frame, [x1, y1, x2, y2].
    pub roi: Option<[u32; 4]>,
    /// Average changed-pixel ratio above which motion is considered active.
    pub motion_threshold: f64,
    /// Analyze every n-th frame.
    pub skip_frames: u32,
    /// Spatial downscale applied before analysis.
    pub resize_factor: f64,
    /// Scale skip_frames with the source frame rate.
    pub adaptive_skip: bool,
    /// Write per-frame diff masks under <output>/debug/.
    pub debug: bool,
    /// Memory usage percentage that triggers pressure warnings.
    pub memory_limit_percent: f64,
    /// Parallel video workers; None picks a value from the CPU count.
    pub max_workers: Option<usize>,
    /// Weights file the detector command receives.
    pub model: String,
    /// External detector command; None disables object gating.
    pub detector_command: Option<String>,
    /// Regex a video file name must match to be picked up; None takes every
    /// .mp4 in the folder.
    pub file_filter: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            confidence: 0.35,
            buffer_seconds: 5.0,
            min_object_area_ratio: 0.002,
            target_classes: vec![0, 1, 2, 3, 5, 7],
            roi: None,
            motion_threshold: 0.015,
            skip_frames: 15,
            resize_factor: 0.5,
            adaptive_skip: true,
            debug: false,
            memory_limit_percent: 85.0,
            max_workers: None,
            model: "yolo11n.pt".to_string(),
            detector_command: None,
            file_filter: None,
        }
    }
}

impl ProcessingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a YAML or JSON file, picked by extension.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration_with_context(
                format!("Failed to read config file: {}", e),
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;

        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                Error::configuration_with_context(
                    format!("Invalid YAML config: {}", e),
                    ErrorContext::new().with_field_path(path.display().to_string()),
                )
            })?,
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                Error::configuration_with_context(
                    format!("Invalid JSON config: {}", e),
                    ErrorContext::new().with_field_path(path.display().to_string()),
                )
            })?,
            other => {
                return Err(Error::configuration_with_context(
                    "Unsupported config extension",
                    ErrorContext::new()
                        .with_field_path(path.display().to_string())
                        .with_details(format!(
                            "expected .yaml, .yml or .json, got {:?}",
                            other.unwrap_or("none")
                        )),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges before a run starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.confidence > 0.0 && self.confidence <= 1.0) {
            return Err(Error::validation_with_context(
                "confidence must be in (0, 1]",
                ErrorContext::new()
                    .with_field_path("config.confidence")
                    .with_details(format!("got {}", self.confidence)),
            ));
        }
        if !(self.resize_factor > 0.0 && self.resize_factor <= 1.0) {
            return Err(Error::validation_with_context(
                "resize_factor must be in (0, 1]",
                ErrorContext::new()
                    .with_field_path("config.resize_factor")
                    .with_details(format!("got {}", self.resize_factor)),
            ));
        }
        if self.skip_frames == 0 {
            return Err(Error::validation_with_context(
                "skip_frames must be at least 1",
                ErrorContext::new().with_field_path("config.skip_frames"),
            ));
        }
        if self.buffer_seconds < 0.0 {
            return Err(Error::validation_with_context(
                "buffer_seconds must not be negative",
                ErrorContext::new()
                    .with_field_path("config.buffer_seconds")
                    .with_details(format!("got {}", self.buffer_seconds)),
            ));
        }
        if self.min_object_area_ratio < 0.0 || self.min_object_area_ratio > 1.0 {
            return Err(Error::validation_with_context(
                "min_object_area_ratio must be in [0, 1]",
                ErrorContext::new().with_field_path("config.min_object_area_ratio"),
            ));
        }
        if !(self.memory_limit_percent > 0.0 && self.memory_limit_percent <= 100.0) {
            return Err(Error::validation_with_context(
                "memory_limit_percent must be in (0, 100]",
                ErrorContext::new().with_field_path("config.memory_limit_percent"),
            ));
        }
        if let Some(pattern) = &self.file_filter {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(Error::validation_with_context(
                    "file_filter is not a valid regex",
                    ErrorContext::new()
                        .with_field_path("config.file_filter")
                        .with_details(e.to_string()),
                ));
            }
        }
        if let Some([x1, y1, x2, y2]) = self.roi {
            if x1 >= x2 || y1 >= y2 {
                return Err(Error::validation_with_context(
                    "roi coordinates must satisfy x1 < x2 and y1 < y2",
                    ErrorContext::new()
                        .with_field_path("config.roi")
                        .with_details(format!("got [{}, {}, {}, {}]", x1, y1, x2, y2)),
                ));
            }
        }
        Ok(())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_max_workers(mut self, workers: Option<usize>) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_detector_command(mut self, command: impl Into<String>) -> Self {
        self.detector_command = Some(command.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_file_filter(mut self, pattern: impl Into<String>) -> Self {
        self.file_filter = Some(pattern.into());
        self
    }
}

/// Where footage comes from and where clips land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPaths {
    pub base_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/data/Input"),
            output_dir: PathBuf::from("/data/Output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProcessingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.skip_frames, 15);
        assert_eq!(config.target_classes, vec![0, 1, 2, 3, 5, 7]);
        assert!((config.motion_threshold - 0.015).abs() < 1e-9);
        assert_eq!(config.model, "yolo11n.pt");
    }

    #[test]
    fn test_confidence_range_checked() {
        let config = ProcessingConfig::default().with_confidence(1.5);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("config.confidence"));
    }

    #[test]
    fn test_zero_skip_rejected() {
        let mut config = ProcessingConfig::default();
        config.skip_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_file_filter_rejected() {
        let config = ProcessingConfig::default().with_file_filter("cam[");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("config.file_filter"));
    }

    #[test]
    fn test_roi_ordering_checked() {
        let mut config = ProcessingConfig::default();
        config.roi = Some([100, 0, 50, 50]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("config.roi"));
    }

    #[test]
    fn test_yaml_roundtrip_with_partial_fields() {
        let yaml = "confidence: 0.5\nskip_frames: 10\nroi: [0, 0, 320, 240]\n";
        let config: ProcessingConfig = serde_yaml::from_str(yaml).unwrap();
        assert!((config.confidence - 0.5).abs() < 1e-6);
        assert_eq!(config.skip_frames, 10);
        assert_eq!(config.roi, Some([0, 0, 320, 240]));
        // Unspecified fields fall back to defaults.
        assert!((config.resize_factor - 0.5).abs() < 1e-9);
        assert!(config.adaptive_skip);
    }

    #[test]
    fn test_builders_chain() {
        let config = ProcessingConfig::new()
            .with_model("yolov8s.pt")
            .with_confidence(0.6)
            .with_max_workers(Some(2))
            .with_debug(true);
        assert_eq!(config.model, "yolov8s.pt");
        assert_eq!(config.max_workers, Some(2));
        assert!(config.debug);
    }
}
