//! Accelerated filter backend seam.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use fpipe_models::{FilterKind, VideoMetadata};

/// Failure modes of the accelerated path.
///
/// Capability absence and runtime failure are deliberately distinct:
/// `Unavailable` disables the backend for the rest of the job, while
/// `Execution` only falls back for the frame at hand.
#[derive(Debug, Error)]
pub enum AccelError {
    #[error("accelerated backend unavailable")]
    Unavailable,

    #[error("accelerated execution failed: {0}")]
    Execution(String),
}

/// A device-accelerated implementation of the pixel filters.
///
/// Acquired at most once per node and shared read-only across the job; the
/// CPU path remains the correctness reference, so an implementation may
/// fail any call and the caller still produces the frame.
#[cfg_attr(test, mockall::automock)]
pub trait FilterAccelerator: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Apply `kind` to `frame` in place, returning device time on success.
    fn apply(
        &self,
        kind: FilterKind,
        frame: &mut [u8],
        meta: &VideoMetadata,
    ) -> Result<Duration, AccelError>;
}

/// One-time capability probe for an accelerated backend.
///
/// No accelerated backend is compiled into this build; wiring one in means
/// returning it here.
pub fn detect_accelerator() -> Option<Arc<dyn FilterAccelerator>> {
    debug!("no accelerated filter backend compiled in, using CPU path");
    None
}
