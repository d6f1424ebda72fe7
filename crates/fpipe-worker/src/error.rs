//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] fpipe_storage::StorageError),

    #[error("Coordination error: {0}")]
    Coord(#[from] fpipe_coord::CoordError),

    #[error("Media error: {0}")]
    Media(#[from] fpipe_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] fpipe_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Whether the failure is the group-wide abort signal rather than a
    /// local fault.
    pub fn is_group_abort(&self) -> bool {
        matches!(self, Self::Coord(e) if e.is_group_abort())
    }
}
