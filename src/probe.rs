//! Media metadata via ffprobe.

use crate::pipeline::VideoError;
use lru::LruCache;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Metadata for a single video file, as reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    pub duration_seconds: f64,
}

#[derive(Deserialize)]
struct ProbeDoc {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Probe a video's first video stream.
pub async fn probe_video(ffprobe: &Path, video: &Path) -> Result<VideoMeta, VideoError> {
    let output = tokio::process::Command::new(ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height,r_frame_rate,nb_frames,duration")
        .arg("-of")
        .arg("json")
        .arg(video)
        .output()
        .await
        .map_err(|e| VideoError::Probe {
            path: video.display().to_string(),
            reason: format!("failed to run ffprobe: {}", e),
        })?;

    if !output.status.success() {
        return Err(VideoError::Probe {
            path: video.display().to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_probe_output(&output.stdout, video)
}

fn parse_probe_output(bytes: &[u8], video: &Path) -> Result<VideoMeta, VideoError> {
    let doc: ProbeDoc = serde_json::from_slice(bytes).map_err(|e| VideoError::Probe {
        path: video.display().to_string(),
        reason: format!("unparseable ffprobe output: {}", e),
    })?;

    let stream = doc.streams.first().ok_or_else(|| VideoError::Probe {
        path: video.display().to_string(),
        reason: "no video stream".to_string(),
    })?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(VideoError::Probe {
                path: video.display().to_string(),
                reason: "stream reports no dimensions".to_string(),
            })
        }
    };

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .ok_or_else(|| VideoError::Probe {
            path: video.display().to_string(),
            reason: format!(
                "invalid frame rate '{}'",
                stream.r_frame_rate.as_deref().unwrap_or("")
            ),
        })?;

    let duration_seconds = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    // Container may omit nb_frames; fall back to duration * fps.
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (duration_seconds * fps).round() as u64);

    if frame_count == 0 {
        return Err(VideoError::Probe {
            path: video.display().to_string(),
            reason: "could not determine frame count".to_string(),
        });
    }

    let duration_seconds = if duration_seconds > 0.0 {
        duration_seconds
    } else {
        frame_count as f64 / fps
    };

    Ok(VideoMeta {
        width,
        height,
        fps,
        frame_count,
        duration_seconds,
    })
}

/// Parse an ffprobe rate such as "30000/1001" or "25".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    if rate.is_finite() && rate > 0.0 {
        Some(rate)
    } else {
        None
    }
}

#[derive(Hash, PartialEq, Eq)]
struct ProbeKey {
    path: PathBuf,
    mtime_nanos: Option<u128>,
    len: u64,
}

impl ProbeKey {
    fn for_path(path: &Path) -> Result<Self, VideoError> {
        let meta = std::fs::metadata(path).map_err(|e| VideoError::Probe {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mtime_nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos());
        Ok(Self {
            path: path.to_path_buf(),
            mtime_nanos,
            len: meta.len(),
        })
    }
}

/// Caches probe results keyed by path, mtime and size, so re-listing a
/// folder does not re-run ffprobe for unchanged files.
pub struct ProbeCache {
    entries: Mutex<LruCache<ProbeKey, VideoMeta>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(100).expect("nonzero cache capacity"),
            )),
        }
    }

    pub async fn probe(&self, ffprobe: &Path, video: &Path) -> Result<VideoMeta, VideoError> {
        let key = ProbeKey::for_path(video)?;
        {
            let mut entries = self.entries.lock().map_err(|e| {
                VideoError::Internal(format!("Failed to acquire probe cache lock: {}", e))
            })?;
            if let Some(meta) = entries.get(&key) {
                return Ok(meta.clone());
            }
        }

        let meta = probe_video(ffprobe, video).await?;

        let mut entries = self.entries.lock().map_err(|e| {
            VideoError::Internal(format!("Failed to acquire probe cache lock: {}", e))
        })?;
        entries.put(key, meta.clone());
        Ok(meta)
    }
}

impl Default for ProbeCache {
    fn default() -> Self {
        Self::new()
    }
}
