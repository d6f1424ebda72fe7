//! Error types for media operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Unreadable source: {0}")]
    UnreadableSource(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Missing segment for rank {rank}: {path}")]
    MissingSegment { rank: usize, path: PathBuf },

    #[error("Merge tool failed: {0}")]
    MergeToolFailure(String),

    #[error("Frame geometry mismatch: {0}")]
    GeometryMismatch(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an unreadable-source error.
    pub fn unreadable_source(message: impl Into<String>) -> Self {
        Self::UnreadableSource(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a merge tool failure.
    pub fn merge_tool_failure(message: impl Into<String>) -> Self {
        Self::MergeToolFailure(message.into())
    }

    /// Create a geometry mismatch error.
    pub fn geometry_mismatch(message: impl Into<String>) -> Self {
        Self::GeometryMismatch(message.into())
    }
}
