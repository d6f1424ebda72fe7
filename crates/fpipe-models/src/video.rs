//! Source video metadata.

use serde::{Deserialize, Serialize};

/// Geometry, rate and length of the source artifact.
///
/// Established exactly once, on the coordinator, by probing the acquired
/// artifact; broadcast read-only to every node afterwards. Every node must
/// hold an identical copy before computing its frame range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Total decodable frames in the artifact
    pub total_frames: u64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Container codec tag (opaque)
    pub codec_tag: String,
}

impl VideoMetadata {
    /// Size in bytes of one packed RGB24 frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}
