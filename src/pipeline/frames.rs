//! Analysis frames from an ffmpeg rawvideo pipe.
//!
//! ffmpeg decodes, scales and grayscales the source; this side only slices
//! the byte stream into fixed-size frames. Keeping the pixel work in ffmpeg
//! means one child process per video and no codec dependencies here.

use crate::detect::FramePixels;
use crate::pipeline::VideoError;
use bytes::{Buf, BytesMut};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio_util::codec::{Decoder, FramedRead};

/// Splits a rawvideo gray byte stream into whole frames.
pub struct RawFrameCodec {
    width: u32,
    height: u32,
    frame_len: usize,
}

impl RawFrameCodec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_len: width as usize * height as usize,
        }
    }
}

impl Decoder for RawFrameCodec {
    type Item = FramePixels;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FramePixels>, std::io::Error> {
        if src.len() < self.frame_len {
            src.reserve(self.frame_len - src.len());
            return Ok(None);
        }
        let data = src.copy_to_bytes(self.frame_len);
        Ok(Some(FramePixels::new(self.width, self.height, data)))
    }
}

/// Frames from one video, scaled to the analysis size.
pub struct FrameStream {
    path: PathBuf,
    child: Child,
    frames: FramedRead<ChildStdout, RawFrameCodec>,
    finished: bool,
}

impl FrameStream {
    /// Spawn the decoder child for a video. `width`/`height` are the
    /// analysis dimensions, already downscaled.
    pub async fn open(
        ffmpeg: &Path,
        video: &Path,
        width: u32,
        height: u32,
    ) -> Result<Self, VideoError> {
        let mut child = tokio::process::Command::new(ffmpeg)
            .arg("-i")
            .arg(video)
            .arg("-vf")
            .arg(format!("scale={}:{}", width, height))
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("gray")
            .arg("-loglevel")
            .arg("error")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VideoError::Decode {
                path: video.display().to_string(),
                reason: format!("failed to run ffmpeg: {}", e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| VideoError::Decode {
            path: video.display().to_string(),
            reason: "could not open ffmpeg stdout".to_string(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            let name = video.display().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "clipsieve::decoder", video = %name, "{}", line);
                }
            });
        }

        Ok(Self {
            path: video.to_path_buf(),
            child,
            frames: FramedRead::new(stdout, RawFrameCodec::new(width, height)),
            finished: false,
        })
    }

    /// Next frame, or `None` once the child exits cleanly. An abnormal
    /// exit or a truncated trailing frame is a decode error.
    pub async fn next_frame(&mut self) -> Result<Option<FramePixels>, VideoError> {
        if self.finished {
            return Ok(None);
        }
        match self.frames.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(VideoError::Decode {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
            None => {
                self.finished = true;
                let status = self.child.wait().await.map_err(|e| VideoError::Decode {
                    path: self.path.display().to_string(),
                    reason: format!("ffmpeg wait failed: {}", e),
                })?;
                if status.success() {
                    Ok(None)
                } else {
                    Err(VideoError::Decode {
                        path: self.path.display().to_string(),
                        reason: format!("ffmpeg exited with {}", status),
                    })
                }
            }
        }
    }
}
