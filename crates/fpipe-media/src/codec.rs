//! Codec seam.
//!
//! The pipeline treats the container format purely as a frame source/sink:
//! decode is a random seek to a frame index followed by sequential reads,
//! encode is sequential appends at a fixed geometry and rate. Frame buffers
//! are packed RGB24, `width * height * 3` bytes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use fpipe_models::VideoMetadata;

use crate::error::MediaResult;
use crate::ffmpeg::FfmpegCodec;
use crate::rawvideo::{RawVideoCodec, RAW_EXTENSION};

/// Result of pulling the next frame from a source.
#[derive(Debug)]
pub enum FramePull {
    /// One decoded RGB24 frame
    Frame(Vec<u8>),
    /// A frame exists at this position but could not be decoded
    Corrupt,
    /// No more frames
    End,
}

/// Sequential frame decoder.
#[async_trait]
pub trait FrameSource: Send {
    /// Pull the next frame in decode order.
    async fn next_frame(&mut self) -> MediaResult<FramePull>;
}

/// Sequential frame encoder.
#[async_trait]
pub trait FrameSink: Send {
    /// Append one RGB24 frame.
    async fn write_frame(&mut self, frame: &[u8]) -> MediaResult<()>;

    /// Flush, close the container, and wait for the encoder.
    async fn finish(&mut self) -> MediaResult<()>;
}

/// A container format the pipeline can decode from and encode into.
#[async_trait]
pub trait VideoCodec: Send + Sync {
    /// Probe the artifact for canonical metadata.
    ///
    /// Fails with [`crate::MediaError::UnreadableSource`] when the artifact
    /// cannot be opened or reports a non-positive frame count.
    async fn probe(&self, path: &Path) -> MediaResult<VideoMetadata>;

    /// Open for sequential decode starting at `start_frame`.
    async fn open_source(
        &self,
        path: &Path,
        meta: &VideoMetadata,
        start_frame: u64,
    ) -> MediaResult<Box<dyn FrameSource>>;

    /// Create a sink with the source geometry and frame rate.
    async fn create_sink(
        &self,
        path: &Path,
        meta: &VideoMetadata,
    ) -> MediaResult<Box<dyn FrameSink>>;

    /// Concatenate finished segments, frame-sequence exact, into `output`.
    ///
    /// Callers hand in a temporary output path and rename afterwards;
    /// implementations clean up any scratch files (such as a concat
    /// manifest) before returning.
    async fn concat(
        &self,
        segments: &[PathBuf],
        output: &Path,
        meta: &VideoMetadata,
    ) -> MediaResult<()>;

    /// File extension for artifacts in this container.
    fn extension(&self) -> &'static str;
}

/// Pick a codec from the artifact path: `.rawv` selects the raw container,
/// everything else goes through FFmpeg.
pub fn codec_for_path(path: &Path) -> Arc<dyn VideoCodec> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(RAW_EXTENSION) => Arc::new(RawVideoCodec),
        _ => Arc::new(FfmpegCodec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_selection() {
        assert_eq!(codec_for_path(Path::new("/tmp/a.rawv")).extension(), RAW_EXTENSION);
        assert_eq!(codec_for_path(Path::new("/tmp/a.mp4")).extension(), "avi");
        assert_eq!(codec_for_path(Path::new("/tmp/noext")).extension(), "avi");
    }
}
