//! Worker-group coordination for the FramePipe pipeline.
//!
//! One process per node, rank 0 acting as coordinator. All communication is
//! hub-and-spoke over TCP with newline-delimited JSON messages; workers
//! never talk to each other. The group supports exactly three collective
//! operations:
//! - manifest broadcast (coordinator -> all)
//! - named barriers with all-or-nothing semantics
//! - group abort, so a fatal failure anywhere never leaves a node hanging
//!
//! Every wait is bounded; expiry aborts the group instead of blocking
//! forever.

pub mod error;
pub mod group;
pub mod protocol;

pub use error::{CoordError, CoordResult};
pub use group::{GroupConfig, NodeGroup};
pub use protocol::{JobManifest, NodeOutcome, Phase};
