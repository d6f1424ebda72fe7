//! Wire protocol for group rendezvous.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use fpipe_models::VideoMetadata;

/// Named synchronization points of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The artifact is on disk and the manifest has been broadcast
    SourceReady,
    /// Every node has written (or failed) its segment
    SegmentsWritten,
    /// The merge has run and the job is over
    JobComplete,
}

impl Phase {
    /// Stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceReady => "source_ready",
            Self::SegmentsWritten => "segments_written",
            Self::JobComplete => "job_complete",
        }
    }
}

/// What a node brings to a barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// The node completed its phase
    Ok,
    /// The node failed its phase; the barrier turns this into a group abort
    Failed(String),
}

impl NodeOutcome {
    /// Build an outcome from a phase result.
    pub fn from_result<T, E: std::fmt::Display>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Canonical job facts, established once on the coordinator and broadcast
/// to every node before anyone computes a frame range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    /// Local artifact path every node decodes from
    pub artifact_path: PathBuf,
    /// Probed source metadata
    pub metadata: VideoMetadata,
}

/// One message on the coordination channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireMessage {
    /// Worker introduces itself after connecting
    Hello { rank: usize },
    /// Coordinator pushes the job manifest
    Manifest { manifest: JobManifest },
    /// A node reached a barrier, carrying its phase outcome
    BarrierReached {
        phase: Phase,
        rank: usize,
        outcome: NodeOutcome,
    },
    /// Coordinator releases a barrier
    BarrierRelease { phase: Phase },
    /// Fatal failure somewhere; every pending wait resolves to GroupAbort
    Abort { reason: String },
}
