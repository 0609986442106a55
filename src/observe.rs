//! Logging setup: stderr output, optional plain-text log file, and a bounded
//! ring of recent events the console can replay.

use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// How many formatted events the ring keeps.
pub const RECENT_CAPACITY: usize = 100;

/// Default log file name when file logging is enabled without a path.
pub const DEFAULT_LOG_FILE: &str = "video_processing.log";

#[derive(Debug, Clone)]
pub struct ObserveOptions {
    /// Write a plain-text copy of all events to this file (truncated on open).
    pub log_file: Option<PathBuf>,
    /// Filter directive used when RUST_LOG is not set.
    pub directive: String,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            log_file: None,
            directive: "info".to_string(),
        }
    }
}

impl ObserveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }
}

/// One captured event.
#[derive(Debug, Clone)]
pub struct RecentLine {
    pub level: Level,
    pub message: String,
}

struct RecentBuffer {
    lines: RwLock<VecDeque<RecentLine>>,
    cap: usize,
}

impl RecentBuffer {
    fn new(cap: usize) -> Self {
        Self {
            lines: RwLock::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    fn push(&self, line: RecentLine) {
        let mut lines = match self.lines.write() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        if lines.len() == self.cap {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn snapshot(&self) -> Vec<RecentLine> {
        match self.lines.read() {
            Ok(lines) => lines.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    fn clear(&self) {
        match self.lines.write() {
            Ok(mut lines) => lines.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

static RECENT: Lazy<RecentBuffer> = Lazy::new(|| RecentBuffer::new(RECENT_CAPACITY));

/// The last captured events, oldest first.
pub fn recent() -> Vec<RecentLine> {
    RECENT.snapshot()
}

/// Drop all captured events. Used between console runs and by tests.
pub fn clear_recent() {
    RECENT.clear()
}

/// Layer that copies each event's message into the global ring.
pub struct RecentEventsLayer;

impl<S: Subscriber> Layer<S> for RecentEventsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if let Some(message) = visitor.message {
            RECENT.push(RecentLine {
                level: *event.metadata().level(),
                message,
            });
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }
}

/// Install the global subscriber. A second call keeps the existing one, so
/// tests and embedding applications can call this freely.
pub fn init(opts: ObserveOptions) -> crate::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&opts.directive));

    let file_layer = match &opts.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(file_layer)
        .with(RecentEventsLayer);

    if registry.try_init().is_err() {
        tracing::debug!("global subscriber already installed, keeping the existing one");
    }
    Ok(())
}
