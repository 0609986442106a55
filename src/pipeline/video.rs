//! The per-video scan.
//!
//! One pass over the frame stream scores motion on every analyzed frame,
//! asks the detector about every third one, and feeds the verdicts into the
//! segment builder. Extraction happens after the scan so spans are final
//! and merged before any ffmpeg re-encode starts.

use crate::config::ProcessingConfig;
use crate::detect::{DetectionFilter, Detector, FramePixels};
use crate::extract::{extract_clips, ClipRecord};
use crate::memory::MemoryMonitor;
use crate::motion::{motion_mask, motion_score, MotionWindow};
use crate::pipeline::folder::CancelFlag;
use crate::pipeline::frames::FrameStream;
use crate::pipeline::progress::{ProgressEvent, ProgressSink};
use crate::pipeline::VideoError;
use crate::probe::probe_video;
use crate::segment::{SegmentBuilder, Span};
use crate::tools::FfmpegTools;
use std::path::Path;
use std::sync::Arc;

/// Memory ceiling for in-scan warnings. Folder-level monitoring uses the
/// configured limit; the scan itself only warns when things get dire.
const SCAN_MEMORY_LIMIT_PERCENT: f64 = 90.0;

/// What one video produced.
#[derive(Debug, Clone)]
pub struct VideoOutcome {
    pub file_name: String,
    pub spans: Vec<Span>,
    pub clips: Vec<ClipRecord>,
    pub detections: u64,
}

/// Scans a single video and extracts its activity clips.
pub struct VideoJob {
    config: ProcessingConfig,
    tools: FfmpegTools,
    detector: Arc<dyn Detector>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
}

impl VideoJob {
    pub fn new(
        config: ProcessingConfig,
        tools: FfmpegTools,
        detector: Arc<dyn Detector>,
        sink: Arc<dyn ProgressSink>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            config,
            tools,
            detector,
            sink,
            cancel,
        }
    }

    pub async fn run(&self, video: &Path, output_dir: &Path) -> Result<VideoOutcome, VideoError> {
        let file_name = video
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| video.display().to_string());
        let stem = video
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");

        if self.cancel.is_canceled() {
            return Err(VideoError::Cancelled);
        }

        let meta = probe_video(&self.tools.ffprobe, video).await?;
        let skip = effective_skip(self.config.skip_frames, meta.fps, self.config.adaptive_skip);
        let detect_every = skip * 3;
        let buffer_frames = (self.config.buffer_seconds * meta.fps) as u64;
        let (width, height) = analysis_dims(meta.width, meta.height, self.config.resize_factor);

        tracing::info!(
            video = %file_name,
            fps = meta.fps,
            frames = meta.frame_count,
            skip,
            detector = self.detector.name(),
            "scanning"
        );
        self.sink.emit(ProgressEvent::VideoStarted {
            video: file_name.clone(),
        });

        let filter = DetectionFilter::new(&self.config, meta.width, meta.height);
        let mut window = MotionWindow::new(self.config.motion_threshold);
        let mut builder = SegmentBuilder::new(buffer_frames, meta.frame_count);
        let memory = MemoryMonitor::new(SCAN_MEMORY_LIMIT_PERCENT);
        let mut debug_dir = if self.config.debug {
            Some(output_dir.join("debug"))
        } else {
            None
        };
        if let Some(dir) = &debug_dir {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                tracing::warn!("debug dumps disabled, could not create {}: {}", dir.display(), e);
                debug_dir = None;
            }
        }

        let mut stream = FrameStream::open(&self.tools.ffmpeg, video, width, height).await?;
        let mut prev: Option<FramePixels> = None;
        let mut detections: u64 = 0;
        let mut frame_idx: u64 = 0;

        while let Some(frame) = stream.next_frame().await? {
            let idx = frame_idx;
            frame_idx += 1;
            if idx % skip != 0 {
                continue;
            }
            if self.cancel.is_canceled() {
                tracing::info!(video = %file_name, frame = idx, "scan canceled");
                return Err(VideoError::Cancelled);
            }

            let analysis = match self.config.roi {
                Some(roi) => frame.crop(roi),
                None => frame.clone(),
            };

            let motion_active = match &prev {
                Some(previous) => {
                    let score = motion_score(&analysis.data, &previous.data);
                    if let Some(dir) = &debug_dir {
                        dump_mask(dir, stem, idx, &analysis, &previous.data);
                    }
                    window.observe(score)
                }
                None => false,
            };

            let mut objects_active = false;
            if idx % detect_every == 0 {
                let found = self.detector.detect(&frame).await?;
                if let Some(hit) = filter.first_admitted(&found) {
                    objects_active = true;
                    detections += 1;
                    tracing::debug!(
                        video = %file_name,
                        frame = idx,
                        class_id = hit.class_id,
                        confidence = hit.confidence,
                        "object admitted"
                    );
                }
            }

            builder.observe(idx, motion_active, objects_active);

            let percent = ((idx * 100) / meta.frame_count.max(1)).min(100) as u8;
            self.sink.emit(ProgressEvent::VideoProgress {
                video: file_name.clone(),
                percent,
                detections,
                segments: builder.closed_count(),
            });

            if idx % 100 == 0 {
                if let Some(used) = memory.over_limit() {
                    tracing::warn!(video = %file_name, "memory usage high during scan: {:.1}%", used);
                }
            }

            prev = Some(analysis);
        }

        let spans = builder.finish();
        tracing::info!(
            video = %file_name,
            spans = spans.len(),
            detections,
            "scan finished"
        );

        let clips = extract_clips(&self.tools.ffmpeg, video, &spans, meta.fps, output_dir).await?;

        self.sink.emit(ProgressEvent::VideoProgress {
            video: file_name.clone(),
            percent: 100,
            detections,
            segments: spans.len(),
        });

        Ok(VideoOutcome {
            file_name,
            spans,
            clips,
            detections,
        })
    }
}

/// Frame stride after adapting to the source frame rate. High-rate sources
/// stretch the stride, low-rate sources shrink it, and anything in the
/// normal range keeps the configured value.
fn effective_skip(configured: u32, fps: f64, adaptive: bool) -> u64 {
    let mut skip = configured as u64;
    if adaptive {
        if fps > 30.0 {
            skip = (configured as f64 * fps / 30.0) as u64;
        } else if fps < 15.0 {
            skip = ((configured as f64 * fps / 30.0) as u64).max(1);
        }
    }
    skip.max(1)
}

fn analysis_dims(width: u32, height: u32, resize_factor: f64) -> (u32, u32) {
    let w = ((width as f64 * resize_factor).round() as u32).max(1);
    let h = ((height as f64 * resize_factor).round() as u32).max(1);
    (w, h)
}

fn dump_mask(dir: &Path, stem: &str, idx: u64, analysis: &FramePixels, previous: &[u8]) {
    let mask = motion_mask(&analysis.data, previous);
    let path = dir.join(format!("{}_frame_{}.png", stem, idx));
    if let Err(e) = image::save_buffer(
        &path,
        &mask,
        analysis.width,
        analysis.height,
        image::ExtendedColorType::L8,
    ) {
        tracing::debug!("could not write debug mask {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_skip_normal_range_unchanged() {
        assert_eq!(effective_skip(15, 30.0, true), 15);
        assert_eq!(effective_skip(15, 20.0, true), 15);
        assert_eq!(effective_skip(15, 15.0, true), 15);
    }

    #[test]
    fn test_effective_skip_scales_up_for_high_fps() {
        assert_eq!(effective_skip(15, 60.0, true), 30);
        // 59.94 fps truncates like the old tooling did.
        assert_eq!(effective_skip(15, 59.94, true), 29);
    }

    #[test]
    fn test_effective_skip_scales_down_for_low_fps() {
        assert_eq!(effective_skip(15, 10.0, true), 5);
        // Very low rates floor at one.
        assert_eq!(effective_skip(15, 1.0, true), 1);
    }

    #[test]
    fn test_effective_skip_adaptive_off() {
        assert_eq!(effective_skip(15, 60.0, false), 15);
    }

    #[tokio::test]
    async fn test_canceled_job_stops_without_scanning() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        // Tool paths never resolve; a canceled job must bail before trying.
        let tools = FfmpegTools {
            ffmpeg: "/nonexistent/ffmpeg".into(),
            ffprobe: "/nonexistent/ffprobe".into(),
        };
        let job = VideoJob::new(
            ProcessingConfig::default(),
            tools,
            Arc::new(crate::detect::NullDetector),
            Arc::new(crate::pipeline::progress::NoopSink),
            cancel,
        );
        let err = job
            .run(Path::new("/nonexistent/cam.mp4"), Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(matches!(err, VideoError::Cancelled));
    }

    #[test]
    fn test_analysis_dims_round_and_floor() {
        assert_eq!(analysis_dims(1920, 1080, 0.5), (960, 540));
        assert_eq!(analysis_dims(1279, 719, 0.5), (640, 360));
        assert_eq!(analysis_dims(1, 1, 0.1), (1, 1));
    }
}
