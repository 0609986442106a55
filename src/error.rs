use crate::journal::JournalError;
use crate::launch::LaunchError;
use crate::pipeline::VideoError;
use crate::tools::ToolError;
use crate::weights::WeightsError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Configuration key or field that caused the error (e.g., "config.confidence", "roi[2]")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "folder_run")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the clipsieve runtime.
/// Aggregates the per-subsystem errors into actionable, high-level categories.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Weights error: {0}")]
    Weights(#[from] WeightsError),

    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_rendered_inline() {
        let err = Error::configuration_with_context(
            "confidence out of range",
            ErrorContext::new()
                .with_field_path("config.confidence")
                .with_details("expected (0, 1], got 3.5"),
        );
        let text = err.to_string();
        assert!(text.contains("confidence out of range"));
        assert!(text.contains("field: config.confidence"));
        assert!(text.contains("expected (0, 1]"));
    }

    #[test]
    fn test_empty_context_renders_nothing_extra() {
        let err = Error::runtime_with_context("boom", ErrorContext::new());
        assert_eq!(err.to_string(), "Runtime error: boom");
    }

    #[test]
    fn test_context_accessor() {
        let err = Error::validation_with_context(
            "bad roi",
            ErrorContext::new().with_field_path("config.roi"),
        );
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("config.roi")
        );
    }
}
