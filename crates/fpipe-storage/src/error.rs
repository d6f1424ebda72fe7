//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during acquisition.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Remote object size unknown or invalid")]
    SizeUnknown,

    #[error("Range fetch failed for chunk indices {failed:?}")]
    PartialFetchFailure { failed: Vec<usize> },

    #[error("Failed to write local artifact: {0}")]
    WriteFailure(String),

    #[error("Range fetch failed: {0}")]
    FetchFailed(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::FetchFailed(msg.into())
    }

    pub fn write_failure(msg: impl Into<String>) -> Self {
        Self::WriteFailure(msg.into())
    }
}
