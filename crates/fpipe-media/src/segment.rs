//! Per-node segment processing.
//!
//! One node owns one frame range: decode sequentially from the shared
//! artifact, filter each frame, append to a worker-local segment. A frame
//! that cannot be decoded is skipped and tallied, so a single corrupt frame
//! never loses the rest of a long segment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use fpipe_models::{FilterKind, FrameRange, VideoMetadata};

use crate::codec::{FramePull, VideoCodec};
use crate::error::MediaResult;
use crate::transform::{FilterEngine, TransformStats};

/// Deterministic segment path for a job/rank pair.
pub fn segment_path(dir: &Path, job_id: &str, rank: usize, extension: &str) -> PathBuf {
    dir.join(format!("{job_id}_segment_{rank:03}.{extension}"))
}

/// What one node produced for its range.
#[derive(Debug, Clone)]
pub struct SegmentReport {
    /// Rank that produced the segment
    pub rank: usize,
    /// Frames written into the segment
    pub frames_written: u64,
    /// Frames skipped because they could not be decoded
    pub frames_skipped: u64,
    /// Transform statistics for the range
    pub stats: TransformStats,
    /// Where the segment landed
    pub path: PathBuf,
}

/// Processes one node's frame range into a segment.
pub struct SegmentProcessor {
    codec: Arc<dyn VideoCodec>,
    engine: FilterEngine,
}

impl SegmentProcessor {
    /// Create a processor; the engine carries the node's one-time
    /// accelerator handle.
    pub fn new(codec: Arc<dyn VideoCodec>, engine: FilterEngine) -> Self {
        Self { codec, engine }
    }

    /// Decode `range` from `artifact`, apply `filter`, and encode into
    /// `segment`.
    ///
    /// An empty range still produces a valid empty segment so the merge
    /// sees a uniform set. Decode gaps are skipped and counted; running out
    /// of frames early tallies the remainder as skipped.
    pub async fn process(
        mut self,
        artifact: &Path,
        segment: &Path,
        meta: &VideoMetadata,
        range: FrameRange,
        filter: FilterKind,
        rank: usize,
    ) -> MediaResult<SegmentReport> {
        let mut sink = self.codec.create_sink(segment, meta).await?;
        let mut written = 0u64;
        let mut skipped = 0u64;

        if !range.is_empty() {
            let mut source = self.codec.open_source(artifact, meta, range.start).await?;

            for index in range.start..range.end {
                match source.next_frame().await? {
                    FramePull::Frame(mut frame) => {
                        self.engine.apply(filter, &mut frame, meta);
                        sink.write_frame(&frame).await?;
                        written += 1;
                    }
                    FramePull::Corrupt => {
                        warn!(rank, frame = index, "skipping undecodable frame");
                        skipped += 1;
                    }
                    FramePull::End => {
                        let missing = range.end - index;
                        warn!(
                            rank,
                            frame = index,
                            missing,
                            "source ended before the assigned range"
                        );
                        skipped += missing;
                        break;
                    }
                }
            }
        }

        sink.finish().await?;

        counter!("fpipe_frames_processed_total").increment(written);
        counter!("fpipe_frames_skipped_total").increment(skipped);
        info!(
            rank,
            range = %range,
            written,
            skipped,
            filter = filter.name(),
            segment = %segment.display(),
            "segment complete"
        );

        Ok(SegmentReport {
            rank,
            frames_written: written,
            frames_skipped: skipped,
            stats: self.engine.stats().clone(),
            path: segment.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::codec::{FrameSink, FrameSource};
    use crate::error::MediaError;
    use crate::rawvideo::RawVideoCodec;

    fn meta(frames: u64) -> VideoMetadata {
        VideoMetadata {
            total_frames: frames,
            width: 4,
            height: 2,
            fps: 25.0,
            codec_tag: "rawv".to_string(),
        }
    }

    /// Codec double whose source yields a scripted pull sequence and whose
    /// sink records what was written.
    struct ScriptedCodec {
        pulls: Mutex<Option<Vec<FramePull>>>,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    struct ScriptedSource {
        pulls: std::vec::IntoIter<FramePull>,
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn next_frame(&mut self) -> MediaResult<FramePull> {
            Ok(self.pulls.next().unwrap_or(FramePull::End))
        }
    }

    struct RecordingSink {
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn write_frame(&mut self, frame: &[u8]) -> MediaResult<()> {
            self.written.lock().unwrap().push(frame.to_vec());
            Ok(())
        }

        async fn finish(&mut self) -> MediaResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl VideoCodec for ScriptedCodec {
        async fn probe(&self, _path: &Path) -> MediaResult<VideoMetadata> {
            Err(MediaError::unreadable_source("not probed in tests"))
        }

        async fn open_source(
            &self,
            _path: &Path,
            _meta: &VideoMetadata,
            _start_frame: u64,
        ) -> MediaResult<Box<dyn FrameSource>> {
            let pulls = self.pulls.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(ScriptedSource {
                pulls: pulls.into_iter(),
            }))
        }

        async fn create_sink(
            &self,
            _path: &Path,
            _meta: &VideoMetadata,
        ) -> MediaResult<Box<dyn FrameSink>> {
            Ok(Box::new(RecordingSink {
                written: Arc::clone(&self.written),
            }))
        }

        async fn concat(
            &self,
            _segments: &[PathBuf],
            _output: &Path,
            _meta: &VideoMetadata,
        ) -> MediaResult<()> {
            Ok(())
        }

        fn extension(&self) -> &'static str {
            "rawv"
        }
    }

    #[tokio::test]
    async fn test_decode_gap_skips_and_continues() {
        let meta = meta(100);
        let frame_size = meta.frame_size();

        // 100-frame range with frame 57 undecodable.
        let pulls: Vec<FramePull> = (0..100)
            .map(|i| {
                if i == 57 {
                    FramePull::Corrupt
                } else {
                    FramePull::Frame(vec![i as u8; frame_size])
                }
            })
            .collect();

        let written = Arc::new(Mutex::new(Vec::new()));
        let codec = Arc::new(ScriptedCodec {
            pulls: Mutex::new(Some(pulls)),
            written: Arc::clone(&written),
        });

        let report = SegmentProcessor::new(codec, FilterEngine::new(None))
            .process(
                Path::new("/tmp/in.rawv"),
                Path::new("/tmp/seg.rawv"),
                &meta,
                FrameRange { start: 0, end: 100 },
                FilterKind::None,
                1,
            )
            .await
            .unwrap();

        assert_eq!(report.frames_written, 99);
        assert_eq!(report.frames_skipped, 1);
        assert_eq!(written.lock().unwrap().len(), 99);
    }

    #[tokio::test]
    async fn test_early_end_tallies_remainder_as_skipped() {
        let meta = meta(10);
        let frame_size = meta.frame_size();

        let pulls: Vec<FramePull> = (0..6)
            .map(|i| FramePull::Frame(vec![i as u8; frame_size]))
            .collect();

        let codec = Arc::new(ScriptedCodec {
            pulls: Mutex::new(Some(pulls)),
            written: Arc::new(Mutex::new(Vec::new())),
        });

        let report = SegmentProcessor::new(codec, FilterEngine::new(None))
            .process(
                Path::new("/tmp/in.rawv"),
                Path::new("/tmp/seg.rawv"),
                &meta,
                FrameRange { start: 0, end: 10 },
                FilterKind::None,
                0,
            )
            .await
            .unwrap();

        assert_eq!(report.frames_written, 6);
        assert_eq!(report.frames_skipped, 4);
    }

    #[tokio::test]
    async fn test_processing_over_the_raw_container() {
        let dir = tempfile::tempdir().unwrap();
        let meta = meta(6);
        let codec = Arc::new(RawVideoCodec);

        // Source artifact: six frames valued 100 + index.
        let artifact = dir.path().join("source.rawv");
        {
            let mut sink = codec.create_sink(&artifact, &meta).await.unwrap();
            for i in 0..6u8 {
                sink.write_frame(&vec![100 + i; meta.frame_size()])
                    .await
                    .unwrap();
            }
            sink.finish().await.unwrap();
        }

        // Process the middle range [2, 4) with invert.
        let segment = segment_path(dir.path(), "job-9", 1, "rawv");
        let report = SegmentProcessor::new(Arc::clone(&codec) as Arc<dyn VideoCodec>, FilterEngine::new(None))
            .process(
                &artifact,
                &segment,
                &meta,
                FrameRange { start: 2, end: 4 },
                FilterKind::Invert,
                1,
            )
            .await
            .unwrap();

        assert_eq!(report.frames_written, 2);
        assert_eq!(report.frames_skipped, 0);

        let mut source = codec.open_source(&segment, &meta, 0).await.unwrap();
        for expected in [255 - 102u8, 255 - 103u8] {
            match source.next_frame().await.unwrap() {
                FramePull::Frame(frame) => assert!(frame.iter().all(|&b| b == expected)),
                other => panic!("expected frame, got {other:?}"),
            }
        }
        assert!(matches!(source.next_frame().await.unwrap(), FramePull::End));
    }

    #[tokio::test]
    async fn test_empty_range_writes_valid_empty_segment() {
        let dir = tempfile::tempdir().unwrap();
        let meta = meta(4);
        let codec = Arc::new(RawVideoCodec);

        let segment = segment_path(dir.path(), "job-9", 2, "rawv");
        let report = SegmentProcessor::new(codec, FilterEngine::new(None))
            .process(
                dir.path().join("unused.rawv").as_path(),
                &segment,
                &meta,
                FrameRange { start: 4, end: 4 },
                FilterKind::Invert,
                2,
            )
            .await
            .unwrap();

        assert_eq!(report.frames_written, 0);
        assert!(segment.exists());
    }

    #[test]
    fn test_segment_path_is_deterministic() {
        let path = segment_path(Path::new("/work"), "job-42", 7, "avi");
        assert_eq!(path, PathBuf::from("/work/job-42_segment_007.avi"));
    }
}
