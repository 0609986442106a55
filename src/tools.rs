//! Discovery of the external ffmpeg/ffprobe binaries.

use std::path::PathBuf;
use thiserror::Error;

/// Environment override for the ffmpeg binary.
pub const FFMPEG_ENV: &str = "CLIPSIEVE_FFMPEG";
/// Environment override for the ffprobe binary.
pub const FFPROBE_ENV: &str = "CLIPSIEVE_FFPROBE";

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Required binary not found: {name}{}", .hint.as_ref().map(|h| format!("\n  Hint: {}", h)).unwrap_or_default())]
    MissingBinary { name: String, hint: Option<String> },
}

/// Resolved paths to the ffmpeg binaries the pipeline shells out to.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl FfmpegTools {
    /// Locate ffmpeg and ffprobe. Environment overrides win over PATH
    /// lookup so containers can pin exact binaries.
    pub fn discover() -> Result<Self, ToolError> {
        Ok(Self {
            ffmpeg: find_tool("ffmpeg", FFMPEG_ENV)?,
            ffprobe: find_tool("ffprobe", FFPROBE_ENV)?,
        })
    }
}

fn find_tool(name: &str, env_key: &str) -> Result<PathBuf, ToolError> {
    if let Ok(value) = std::env::var(env_key) {
        if !value.is_empty() {
            let path = PathBuf::from(&value);
            if path.is_file() {
                tracing::debug!(binary = %name, path = %path.display(), "using binary from environment");
                return Ok(path);
            }
            return Err(ToolError::MissingBinary {
                name: name.to_string(),
                hint: Some(format!(
                    "{} is set to '{}' but no file exists there",
                    env_key, value
                )),
            });
        }
    }

    which::which(name).map_err(|_| ToolError::MissingBinary {
        name: name.to_string(),
        hint: Some(format!(
            "install ffmpeg and make sure '{}' is on PATH, or set {}",
            name, env_key
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_must_exist() {
        let key = "CLIPSIEVE_TEST_TOOL_MISSING";
        std::env::set_var(key, "/nonexistent/ffmpeg-test");
        let err = find_tool("ffmpeg", key).unwrap_err();
        std::env::remove_var(key);
        let text = err.to_string();
        assert!(text.contains("ffmpeg"));
        assert!(text.contains(key));
    }

    #[test]
    fn test_env_override_points_at_file() {
        let key = "CLIPSIEVE_TEST_TOOL_PRESENT";
        let path = std::env::temp_dir().join(format!("clipsieve-tool-{}", std::process::id()));
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        std::env::set_var(key, &path);
        let found = find_tool("ffmpeg", key).unwrap();
        std::env::remove_var(key);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(found, path);
    }

    #[test]
    fn test_missing_binary_hint_names_env() {
        let err = find_tool("definitely-not-a-binary-xyz", "CLIPSIEVE_TEST_TOOL_UNSET").unwrap_err();
        assert!(err.to_string().contains("CLIPSIEVE_TEST_TOOL_UNSET"));
    }
}
