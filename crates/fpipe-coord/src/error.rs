//! Coordination error types.

use thiserror::Error;

/// Result type for coordination operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// Errors that can occur during group coordination.
#[derive(Debug, Error)]
pub enum CoordError {
    #[error("Broadcast timed out waiting for the job manifest")]
    BroadcastTimeout,

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Group aborted: {reason}")]
    GroupAbort { reason: String },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoordError {
    pub fn peer_unreachable(msg: impl Into<String>) -> Self {
        Self::PeerUnreachable(msg.into())
    }

    pub fn group_abort(reason: impl Into<String>) -> Self {
        Self::GroupAbort {
            reason: reason.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether this error is the group-wide abort signal.
    pub fn is_group_abort(&self) -> bool {
        matches!(self, Self::GroupAbort { .. })
    }
}
