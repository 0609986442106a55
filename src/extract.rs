//! Clip extraction via ffmpeg.

use crate::pipeline::VideoError;
use crate::segment::Span;
use std::path::Path;

/// Spans shorter than this never become clips.
pub const MIN_CLIP_SECONDS: f64 = 1.0;

/// One extracted clip, as recorded in the folder journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRecord {
    pub file_name: String,
    pub objects: bool,
    pub motion: bool,
}

/// Timestamp token used in clip names: `H MM SS` glued together with the
/// hour unpadded, so 83 seconds becomes `00123` and 3661 becomes `10101`.
fn hms_token(seconds: f64) -> String {
    let total = seconds as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{}{:02}{:02}", h, m, s)
}

/// File name for a clip: stem, one-based ordinal, start/end tokens, then
/// `_obj` and `_mot` markers for what gated the span.
pub fn clip_file_name(stem: &str, ordinal: usize, span: &Span, fps: f64) -> String {
    let start = span.start as f64 / fps;
    let end = span.end as f64 / fps;
    let mut name = format!(
        "{}_seg{:03}_{}_{}",
        stem,
        ordinal + 1,
        hms_token(start),
        hms_token(end)
    );
    if span.objects {
        name.push_str("_obj");
    }
    if span.motion {
        name.push_str("_mot");
    }
    name.push_str(".mp4");
    name
}

/// Re-encode one span of the source into `output`.
pub async fn extract_clip(
    ffmpeg: &Path,
    source: &Path,
    span: &Span,
    fps: f64,
    output: &Path,
) -> Result<(), VideoError> {
    let start = span.start as f64 / fps;
    let duration = (span.end - span.start) as f64 / fps;

    let result = tokio::process::Command::new(ffmpeg)
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-ss")
        .arg(start.to_string())
        .arg("-i")
        .arg(source)
        .arg("-t")
        .arg(duration.to_string())
        .arg("-c:v")
        .arg("libx264")
        .arg("-preset")
        .arg("ultrafast")
        .arg("-tune")
        .arg("fastdecode")
        .arg("-threads")
        .arg("2")
        .arg("-c:a")
        .arg("aac")
        .arg(output)
        .output()
        .await
        .map_err(|e| VideoError::Extract {
            path: output.display().to_string(),
            reason: format!("failed to run ffmpeg: {}", e),
        })?;

    if !result.status.success() {
        return Err(VideoError::Extract {
            path: output.display().to_string(),
            reason: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Extract all spans long enough to matter. A failing span is logged and
/// skipped so one bad stretch does not lose the rest of the video. Skipped
/// spans still consume their ordinal, which keeps clip numbering stable
/// against the span list.
pub async fn extract_clips(
    ffmpeg: &Path,
    source: &Path,
    spans: &[Span],
    fps: f64,
    output_dir: &Path,
) -> Result<Vec<ClipRecord>, VideoError> {
    if spans.is_empty() {
        return Ok(Vec::new());
    }
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| VideoError::Extract {
            path: output_dir.display().to_string(),
            reason: format!("could not create output directory: {}", e),
        })?;

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");

    let mut clips = Vec::new();
    for (ordinal, span) in spans.iter().enumerate() {
        let duration = span.duration_seconds(fps);
        if duration < MIN_CLIP_SECONDS {
            tracing::debug!(ordinal, duration, "skipping span below minimum clip length");
            continue;
        }
        let file_name = clip_file_name(stem, ordinal, span, fps);
        let output = output_dir.join(&file_name);
        match extract_clip(ffmpeg, source, span, fps, &output).await {
            Ok(()) => {
                tracing::info!(clip = %file_name, "clip extracted");
                clips.push(ClipRecord {
                    file_name,
                    objects: span.objects,
                    motion: span.motion,
                });
            }
            Err(e) => tracing::warn!("clip extraction failed: {}", e),
        }
    }
    Ok(clips)
}
