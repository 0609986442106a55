//! Progress events and the sinks that carry them.
//!
//! Jobs publish events through a [`ProgressSink`]; what happens next is the
//! sink's business. The batch CLI logs them, the console feeds them into
//! its status line over a channel, and tests capture them in memory.

use std::sync::{Arc, Mutex};

/// What the pipeline reports while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    FolderStarted {
        folder: String,
        videos: usize,
    },
    VideoStarted {
        video: String,
    },
    VideoProgress {
        video: String,
        percent: u8,
        detections: u64,
        segments: usize,
    },
    VideoCompleted {
        video: String,
        clips: usize,
    },
    VideoFailed {
        video: String,
        reason: String,
    },
    MemoryPressure {
        used_percent: f64,
    },
    FolderFinished {
        folder: String,
        processed: usize,
        failed: usize,
    },
}

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that drops everything.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink that logs events. Per-frame progress goes to debug so a normal run
/// stays readable.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FolderStarted { folder, videos } => {
                tracing::info!(folder = %folder, videos, "folder started")
            }
            ProgressEvent::VideoStarted { video } => {
                tracing::info!(video = %video, "processing")
            }
            ProgressEvent::VideoProgress {
                video,
                percent,
                detections,
                segments,
            } => {
                tracing::debug!(video = %video, percent, detections, segments, "progress")
            }
            ProgressEvent::VideoCompleted { video, clips } => {
                tracing::info!(video = %video, clips, "completed")
            }
            ProgressEvent::VideoFailed { video, reason } => {
                tracing::warn!(video = %video, "failed: {}", reason)
            }
            ProgressEvent::MemoryPressure { used_percent } => {
                tracing::warn!("memory usage at {:.1}%", used_percent)
            }
            ProgressEvent::FolderFinished {
                folder,
                processed,
                failed,
            } => {
                tracing::info!(folder = %folder, processed, failed, "folder finished")
            }
        }
    }
}

/// Sink that forwards events into an unbounded channel. A dropped receiver
/// is fine; events just stop going anywhere.
pub struct ChannelSink {
    sender: tokio::sync::mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}

/// Fans one event out to several sinks.
pub struct CompositeSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

impl ProgressSink for CompositeSink {
    fn emit(&self, event: ProgressEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

/// Sink that remembers every event. Test helper.
#[derive(Default)]
pub struct InMemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressSink for InMemorySink {
    fn emit(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_sink_records_in_order() {
        let sink = InMemorySink::new();
        sink.emit(ProgressEvent::VideoStarted {
            video: "a.mp4".to_string(),
        });
        sink.emit(ProgressEvent::VideoCompleted {
            video: "a.mp4".to_string(),
            clips: 2,
        });
        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ProgressEvent::VideoStarted { .. }));
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        sink.emit(ProgressEvent::MemoryPressure { used_percent: 91.0 });
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(InMemorySink::new());
        let b = Arc::new(InMemorySink::new());
        let composite = CompositeSink::new(vec![a.clone(), b.clone()]);
        composite.emit(ProgressEvent::VideoStarted {
            video: "x.mp4".to_string(),
        });
        assert_eq!(a.snapshot().len(), 1);
        assert_eq!(b.snapshot().len(), 1);
    }
}
