//! Redis Streams job intake for the FramePipe worker.
//!
//! Thin glue at the external-collaborator boundary: accept a
//! [`fpipe_models::JobDescriptor`], hand it to the orchestrator, and manage
//! acknowledgment, retry counting, and the dead-letter stream.

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueConfig};
