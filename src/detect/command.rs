//! External detector process speaking newline-delimited JSON.

use super::schema::{WireReply, WireRequest};
use super::{DetectError, Detection, Detector, FramePixels};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

/// Per-request answer deadline.
pub const DETECT_TIMEOUT_SECS: u64 = 30;

/// Environment variable the child receives with the resolved weights path.
pub const MODEL_PATH_ENV: &str = "CLIPSIEVE_MODEL_PATH";

#[derive(Debug)]
struct ChildIo {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    line: String,
}

/// Detector backed by a long-lived child process.
///
/// One request per line on the child's stdin, one reply per line on its
/// stdout. Frames travel as base64 PNG so the child needs no knowledge of
/// our pixel layout. Requests carry an id and replies must echo it; replies
/// for requests that already timed out are drained and dropped.
#[derive(Debug)]
pub struct CommandDetector {
    command: String,
    timeout: Duration,
    next_id: AtomicU64,
    io: Mutex<ChildIo>,
}

impl CommandDetector {
    /// Spawn the detector process. The command string is split on
    /// whitespace; the first token is the program, the rest its arguments.
    /// When a weights path is given the child is invoked with
    /// `--weights <path>` appended and also sees the path in
    /// [`MODEL_PATH_ENV`].
    pub fn spawn(command: &str, model_path: Option<&Path>) -> Result<Self, DetectError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| DetectError::Spawn {
            command: command.to_string(),
            reason: "empty detector command".to_string(),
        })?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = model_path {
            cmd.arg("--weights").arg(path);
            cmd.env(MODEL_PATH_ENV, path);
        }

        let mut child = cmd.spawn().map_err(|e| DetectError::Spawn {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| DetectError::Spawn {
            command: command.to_string(),
            reason: "could not open child stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| DetectError::Spawn {
            command: command.to_string(),
            reason: "could not open child stdout".to_string(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }

        tracing::debug!(command = %command, "detector process started");

        Ok(Self {
            command: command.to_string(),
            timeout: Duration::from_secs(DETECT_TIMEOUT_SECS),
            next_id: AtomicU64::new(1),
            io: Mutex::new(ChildIo {
                child,
                stdin: Some(stdin),
                stdout: BufReader::new(stdout),
                line: String::new(),
            }),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Close the child's stdin and wait briefly for it to exit on its own
    /// before killing it.
    pub async fn shutdown(&self) {
        let mut io = self.io.lock().await;
        io.stdin.take();
        match tokio::time::timeout(Duration::from_secs(2), io.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "detector process exited"),
            Ok(Err(e)) => tracing::debug!("detector wait failed: {}", e),
            Err(_) => {
                if let Err(e) = io.child.kill().await {
                    tracing::debug!("detector kill failed: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl Detector for CommandDetector {
    async fn detect(&self, frame: &FramePixels) -> Result<Vec<Detection>, DetectError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let png = encode_png(frame)?;
        let request = WireRequest {
            id,
            width: frame.width,
            height: frame.height,
            image_png: STANDARD.encode(png),
        };
        let mut line = serde_json::to_string(&request).map_err(|e| DetectError::Protocol {
            reason: format!("could not serialize request: {}", e),
        })?;
        line.push('\n');

        let mut io = self.io.lock().await;
        let seconds = self.timeout.as_secs();
        tokio::time::timeout(self.timeout, roundtrip(&mut io, id, &line))
            .await
            .map_err(|_| DetectError::Timeout { seconds })?
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

async fn roundtrip(io: &mut ChildIo, id: u64, line: &str) -> Result<Vec<Detection>, DetectError> {
    let stdin = io.stdin.as_mut().ok_or_else(|| DetectError::Exited {
        detail: "stdin already closed".to_string(),
    })?;
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| DetectError::Exited {
            detail: format!("stdin write failed: {}", e),
        })?;
    stdin.flush().await.map_err(|e| DetectError::Exited {
        detail: format!("stdin flush failed: {}", e),
    })?;

    loop {
        io.line.clear();
        let n = io
            .stdout
            .read_line(&mut io.line)
            .await
            .map_err(|e| DetectError::Protocol {
                reason: format!("stdout read failed: {}", e),
            })?;
        if n == 0 {
            let detail = match io.child.try_wait() {
                Ok(Some(status)) => status.to_string(),
                _ => "stdout closed".to_string(),
            };
            return Err(DetectError::Exited { detail });
        }

        let trimmed = io.line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let reply: WireReply = serde_json::from_str(trimmed).map_err(|e| DetectError::Protocol {
            reason: format!("unparseable reply: {}", e),
        })?;
        if reply.id == id {
            return Ok(reply.detections);
        }
        if reply.id < id {
            // Late answer to a request that already timed out.
            tracing::debug!(reply_id = reply.id, "dropping stale detector reply");
            continue;
        }
        return Err(DetectError::Protocol {
            reason: format!("reply id {} does not match request id {}", reply.id, id),
        });
    }
}

async fn drain_stderr(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "clipsieve::detector", "{}", line);
    }
}

fn encode_png(frame: &FramePixels) -> Result<Vec<u8>, DetectError> {
    let expected = frame.width as usize * frame.height as usize;
    if frame.data.len() != expected {
        return Err(DetectError::Encode {
            reason: format!(
                "{} bytes for a {}x{} frame",
                frame.data.len(),
                frame.width,
                frame.height
            ),
        });
    }
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&frame.data, frame.width, frame.height, ExtendedColorType::L8)
        .map_err(|e| DetectError::Encode {
            reason: e.to_string(),
        })?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn test_frame() -> FramePixels {
        FramePixels::new(4, 3, Bytes::from(vec![0u8; 12]))
    }

    fn script_detector(body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = std::env::temp_dir().join(format!(
            "clipsieve-detector-{}-{}.sh",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_encode_png_rejects_bad_length() {
        let frame = FramePixels::new(4, 4, Bytes::from(vec![0u8; 3]));
        let err = encode_png(&frame).unwrap_err();
        assert!(matches!(err, DetectError::Encode { .. }));
    }

    #[test]
    fn test_encode_png_produces_png_magic() {
        let png = encode_png(&test_frame()).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
    }

    #[test]
    fn test_spawn_missing_program() {
        let err = CommandDetector::spawn("/nonexistent/detector-xyz", None).unwrap_err();
        assert!(matches!(err, DetectError::Spawn { .. }));
    }

    #[test]
    fn test_spawn_empty_command() {
        let err = CommandDetector::spawn("   ", None).unwrap_err();
        assert!(matches!(err, DetectError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_detect_round_trip() {
        let script = script_detector(
            r#"read line
printf '{"id":1,"detections":[{"class_id":2,"confidence":0.8,"bbox":[0,0,120,90]}]}\n'"#,
        );
        let detector = CommandDetector::spawn(&script.display().to_string(), None).unwrap();
        let detections = detector.detect(&test_frame()).await.unwrap();
        detector.shutdown().await;
        std::fs::remove_file(&script).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 2);
    }

    #[tokio::test]
    async fn test_weights_path_passed_as_argument() {
        // The child refuses to answer unless it was started with
        // `--weights <path>`, so a successful round trip proves the
        // arguments were on its command line.
        let script = script_detector(
            r#"[ "$1" = "--weights" ] || exit 3
[ "$2" = "/models/yolo11n.pt" ] || exit 4
read line
printf '{"id":1,"detections":[]}\n'"#,
        );
        let detector = CommandDetector::spawn(
            &script.display().to_string(),
            Some(Path::new("/models/yolo11n.pt")),
        )
        .unwrap();
        let detections = detector.detect(&test_frame()).await.unwrap();
        detector.shutdown().await;
        std::fs::remove_file(&script).unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn test_detect_drains_stale_replies() {
        let script = script_detector(
            r#"read line
printf '{"id":0,"detections":[]}\n'
printf '{"id":1,"detections":[{"class_id":0,"confidence":0.9,"bbox":[0,0,50,50]}]}\n'"#,
        );
        let detector = CommandDetector::spawn(&script.display().to_string(), None).unwrap();
        let detections = detector.detect(&test_frame()).await.unwrap();
        detector.shutdown().await;
        std::fs::remove_file(&script).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 0);
    }

    #[tokio::test]
    async fn test_detect_reports_dead_child() {
        let script = script_detector("exit 0");
        let detector = CommandDetector::spawn(&script.display().to_string(), None).unwrap();
        let err = detector.detect(&test_frame()).await.unwrap_err();
        std::fs::remove_file(&script).unwrap();
        assert!(matches!(err, DetectError::Exited { .. }));
    }

    #[tokio::test]
    async fn test_detect_times_out() {
        let script = script_detector("read line\nsleep 30");
        let detector = CommandDetector::spawn(&script.display().to_string(), None)
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let err = detector.detect(&test_frame()).await.unwrap_err();
        detector.shutdown().await;
        std::fs::remove_file(&script).unwrap();
        assert!(matches!(err, DetectError::Timeout { .. }));
    }
}
