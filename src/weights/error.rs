//! Weights error types

/// Weights error types
#[derive(Debug, thiserror::Error)]
pub enum WeightsError {
    #[error("Weights not found: {name}{}", .hint.as_ref().map(|h| format!("\n Hint: {}", h)).unwrap_or_default())]
    NotFound { name: String, hint: Option<String> },

    #[error("Failed to download weights from {url}: {reason}{}", .hint.as_ref().map(|h| format!("\n Hint: {}", h)).unwrap_or_default())]
    Download {
        url: String,
        reason: String,
        hint: Option<String>,
    },

    #[error("Checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to load weights from {path}: {reason}")]
    LoadError { path: String, reason: String },

    #[error("Internal weights error: {0}")]
    Internal(String),
}

impl WeightsError {
    /// Attach an actionable hint to the error
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        let hint_val = Some(hint.into());
        match self {
            WeightsError::NotFound { ref mut hint, .. } => *hint = hint_val,
            WeightsError::Download { ref mut hint, .. } => *hint = hint_val,
            _ => (),
        }
        self
    }
}
