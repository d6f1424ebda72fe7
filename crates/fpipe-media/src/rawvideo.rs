//! Minimal raw-RGB24 container.
//!
//! A 32-byte header (magic, version, geometry, rate, frame count) followed
//! by packed RGB24 frames. This is the codec path with no external tool
//! dependency; the integration suites run the full pipeline over it.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::warn;

use fpipe_models::VideoMetadata;

use crate::codec::{FramePull, FrameSink, FrameSource, VideoCodec};
use crate::error::{MediaError, MediaResult};

/// File extension selecting this container.
pub const RAW_EXTENSION: &str = "rawv";

const MAGIC: [u8; 4] = *b"FPRV";
const VERSION: u32 = 1;
const HEADER_LEN: u64 = 32;
/// Byte offset of the frame-count field, patched when a sink finishes.
const FRAME_COUNT_OFFSET: u64 = 24;

/// The raw container codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawVideoCodec;

fn encode_header(meta: &VideoMetadata, total_frames: u64) -> [u8; HEADER_LEN as usize] {
    let mut header = [0u8; HEADER_LEN as usize];
    header[0..4].copy_from_slice(&MAGIC);
    header[4..8].copy_from_slice(&VERSION.to_le_bytes());
    header[8..12].copy_from_slice(&meta.width.to_le_bytes());
    header[12..16].copy_from_slice(&meta.height.to_le_bytes());
    header[16..24].copy_from_slice(&meta.fps.to_bits().to_le_bytes());
    header[24..32].copy_from_slice(&total_frames.to_le_bytes());
    header
}

async fn read_header(file: &mut File, path: &Path) -> MediaResult<VideoMetadata> {
    let mut header = [0u8; HEADER_LEN as usize];
    file.read_exact(&mut header).await.map_err(|_| {
        MediaError::unreadable_source(format!("truncated header in {}", path.display()))
    })?;

    if header[0..4] != MAGIC {
        return Err(MediaError::unreadable_source(format!(
            "bad magic in {}",
            path.display()
        )));
    }

    let u32_at =
        |o: usize| u32::from_le_bytes([header[o], header[o + 1], header[o + 2], header[o + 3]]);
    let u64_at = |o: usize| {
        u64::from_le_bytes([
            header[o],
            header[o + 1],
            header[o + 2],
            header[o + 3],
            header[o + 4],
            header[o + 5],
            header[o + 6],
            header[o + 7],
        ])
    };

    let version = u32_at(4);
    if version != VERSION {
        return Err(MediaError::unreadable_source(format!(
            "unsupported container version {version} in {}",
            path.display()
        )));
    }

    Ok(VideoMetadata {
        total_frames: u64_at(24),
        width: u32_at(8),
        height: u32_at(12),
        fps: f64::from_bits(u64_at(16)),
        codec_tag: RAW_EXTENSION.to_string(),
    })
}

struct RawFrameSource {
    reader: BufReader<File>,
    frame_size: usize,
    remaining: u64,
}

#[async_trait]
impl FrameSource for RawFrameSource {
    async fn next_frame(&mut self) -> MediaResult<FramePull> {
        if self.remaining == 0 {
            return Ok(FramePull::End);
        }

        let mut frame = vec![0u8; self.frame_size];
        let mut filled = 0usize;
        while filled < self.frame_size {
            let n = self.reader.read(&mut frame[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            warn!(missing = self.remaining, "container shorter than its header claims");
            self.remaining = 0;
            return Ok(FramePull::End);
        }
        if filled < self.frame_size {
            warn!(bytes = filled, expected = self.frame_size, "truncated frame");
            self.remaining = 0;
            return Ok(FramePull::Corrupt);
        }

        self.remaining -= 1;
        Ok(FramePull::Frame(frame))
    }
}

struct RawFrameSink {
    writer: BufWriter<File>,
    frame_size: usize,
    frames_written: u64,
}

#[async_trait]
impl FrameSink for RawFrameSink {
    async fn write_frame(&mut self, frame: &[u8]) -> MediaResult<()> {
        if frame.len() != self.frame_size {
            return Err(MediaError::geometry_mismatch(format!(
                "frame is {} bytes, sink expects {}",
                frame.len(),
                self.frame_size
            )));
        }
        self.writer.write_all(frame).await?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> MediaResult<()> {
        self.writer.flush().await?;

        // Patch the frame count now that it is known.
        let file = self.writer.get_mut();
        file.seek(SeekFrom::Start(FRAME_COUNT_OFFSET)).await?;
        file.write_all(&self.frames_written.to_le_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl VideoCodec for RawVideoCodec {
    async fn probe(&self, path: &Path) -> MediaResult<VideoMetadata> {
        let mut file = File::open(path).await.map_err(|e| {
            MediaError::unreadable_source(format!("cannot open {}: {e}", path.display()))
        })?;
        let meta = read_header(&mut file, path).await?;

        if meta.total_frames == 0 || meta.width == 0 || meta.height == 0 || meta.fps <= 0.0 {
            return Err(MediaError::unreadable_source(format!(
                "invalid metadata for {}: {} frames, {}x{} @ {}",
                path.display(),
                meta.total_frames,
                meta.width,
                meta.height,
                meta.fps
            )));
        }
        Ok(meta)
    }

    async fn open_source(
        &self,
        path: &Path,
        meta: &VideoMetadata,
        start_frame: u64,
    ) -> MediaResult<Box<dyn FrameSource>> {
        let mut file = File::open(path).await.map_err(|e| {
            MediaError::unreadable_source(format!("cannot open {}: {e}", path.display()))
        })?;
        let header = read_header(&mut file, path).await?;

        if header.width != meta.width || header.height != meta.height {
            return Err(MediaError::geometry_mismatch(format!(
                "{} is {}x{}, expected {}x{}",
                path.display(),
                header.width,
                header.height,
                meta.width,
                meta.height
            )));
        }

        let frame_size = meta.frame_size();
        file.seek(SeekFrom::Start(
            HEADER_LEN + start_frame * frame_size as u64,
        ))
        .await?;

        Ok(Box::new(RawFrameSource {
            reader: BufReader::new(file),
            frame_size,
            remaining: header.total_frames.saturating_sub(start_frame),
        }))
    }

    async fn create_sink(
        &self,
        path: &Path,
        meta: &VideoMetadata,
    ) -> MediaResult<Box<dyn FrameSink>> {
        let mut file = File::create(path).await?;
        file.write_all(&encode_header(meta, 0)).await?;

        Ok(Box::new(RawFrameSink {
            writer: BufWriter::new(file),
            frame_size: meta.frame_size(),
            frames_written: 0,
        }))
    }

    async fn concat(
        &self,
        segments: &[PathBuf],
        output: &Path,
        meta: &VideoMetadata,
    ) -> MediaResult<()> {
        // In-process read-and-append: pump every segment's frames through a
        // fresh sink in order.
        let mut sink = self.create_sink(output, meta).await?;

        for segment in segments {
            let mut source = self.open_source(segment, meta, 0).await?;
            loop {
                match source.next_frame().await? {
                    FramePull::Frame(frame) => sink.write_frame(&frame).await?,
                    FramePull::Corrupt => {
                        return Err(MediaError::merge_tool_failure(format!(
                            "corrupt frame in segment {}",
                            segment.display()
                        )));
                    }
                    FramePull::End => break,
                }
            }
        }

        sink.finish().await
    }

    fn extension(&self) -> &'static str {
        RAW_EXTENSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(frames: u64) -> VideoMetadata {
        VideoMetadata {
            total_frames: frames,
            width: 4,
            height: 2,
            fps: 10.0,
            codec_tag: RAW_EXTENSION.to_string(),
        }
    }

    fn frame_with(value: u8, meta: &VideoMetadata) -> Vec<u8> {
        vec![value; meta.frame_size()]
    }

    async fn write_segment(path: &Path, meta: &VideoMetadata, values: &[u8]) {
        let codec = RawVideoCodec;
        let mut sink = codec.create_sink(path, meta).await.unwrap();
        for &value in values {
            sink.write_frame(&frame_with(value, meta)).await.unwrap();
        }
        sink.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_roundtrip_and_seek() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.rawv");
        let meta = meta(3);

        write_segment(&path, &meta, &[10, 20, 30]).await;

        let codec = RawVideoCodec;
        let probed = codec.probe(&path).await.unwrap();
        assert_eq!(probed.total_frames, 3);
        assert_eq!(probed.width, 4);
        assert_eq!(probed.height, 2);

        let mut source = codec.open_source(&path, &meta, 1).await.unwrap();
        match source.next_frame().await.unwrap() {
            FramePull::Frame(frame) => assert!(frame.iter().all(|&b| b == 20)),
            other => panic!("expected frame, got {other:?}"),
        }
        match source.next_frame().await.unwrap() {
            FramePull::Frame(frame) => assert!(frame.iter().all(|&b| b == 30)),
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(matches!(source.next_frame().await.unwrap(), FramePull::End));
    }

    #[tokio::test]
    async fn test_concat_preserves_frame_order() {
        let dir = tempfile::tempdir().unwrap();
        let meta = meta(0);

        let seg_a = dir.path().join("a.rawv");
        let seg_b = dir.path().join("b.rawv");
        let empty = dir.path().join("empty.rawv");
        write_segment(&seg_a, &meta, &[1, 2]).await;
        write_segment(&empty, &meta, &[]).await;
        write_segment(&seg_b, &meta, &[3, 4, 5]).await;

        let merged = dir.path().join("merged.rawv");
        let codec = RawVideoCodec;
        codec
            .concat(&[seg_a, empty, seg_b], &merged, &meta)
            .await
            .unwrap();

        let probed = codec.probe(&merged).await.unwrap();
        assert_eq!(probed.total_frames, 5);

        let mut source = codec.open_source(&merged, &meta, 0).await.unwrap();
        for expected in 1..=5u8 {
            match source.next_frame().await.unwrap() {
                FramePull::Frame(frame) => assert!(frame.iter().all(|&b| b == expected)),
                other => panic!("expected frame {expected}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_bad_magic_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.rawv");
        tokio::fs::write(&path, b"not a container at all, nothing to see")
            .await
            .unwrap();

        let err = RawVideoCodec.probe(&path).await.unwrap_err();
        assert!(matches!(err, MediaError::UnreadableSource(_)));
    }

    #[tokio::test]
    async fn test_zero_frame_artifact_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.rawv");
        write_segment(&path, &meta(0), &[]).await;

        let err = RawVideoCodec.probe(&path).await.unwrap_err();
        assert!(matches!(err, MediaError::UnreadableSource(_)));
    }
}
