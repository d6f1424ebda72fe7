//! Codec seam, pixel filters, segment processing and merge.
//!
//! This crate provides:
//! - The [`VideoCodec`]/[`FrameSource`]/[`FrameSink`] seam the pipeline
//!   decodes and encodes through, with an FFmpeg-subprocess implementation
//!   and a minimal raw-RGB24 container
//! - The [`FilterEngine`]: rayon-parallel pixel filters with an
//!   accelerated-backend fallback seam
//! - [`SegmentProcessor`]: one node's decode → filter → encode loop
//! - [`SegmentMerger`]: rank-ordered, atomic concatenation of segments

pub mod accel;
pub mod codec;
pub mod error;
pub mod ffmpeg;
pub mod merge;
pub mod probe;
pub mod rawvideo;
pub mod segment;
pub mod transform;

pub use accel::{detect_accelerator, AccelError, FilterAccelerator};
pub use codec::{codec_for_path, FramePull, FrameSink, FrameSource, VideoCodec};
pub use error::{MediaError, MediaResult};
pub use ffmpeg::FfmpegCodec;
pub use merge::SegmentMerger;
pub use probe::probe_video;
pub use rawvideo::{RawVideoCodec, RAW_EXTENSION};
pub use segment::{segment_path, SegmentProcessor, SegmentReport};
pub use transform::{FilterEngine, TransformStats};
