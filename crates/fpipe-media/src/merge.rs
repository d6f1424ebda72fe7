//! Rank-ordered segment merge.
//!
//! Runs on the coordinator only, after the segments-written barrier
//! confirmed every node finished. The concatenation lands at a temporary
//! path and is renamed into place, so a partial merge is never visible at
//! the final output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use fpipe_models::VideoMetadata;

use crate::codec::VideoCodec;
use crate::error::{MediaError, MediaResult};

/// Merges per-rank segments into the final artifact.
pub struct SegmentMerger {
    codec: Arc<dyn VideoCodec>,
}

impl SegmentMerger {
    /// Create a merger over the job's codec.
    pub fn new(codec: Arc<dyn VideoCodec>) -> Self {
        Self { codec }
    }

    /// Concatenate `segments` (ascending rank order) into `output`.
    ///
    /// Fails with [`MediaError::MissingSegment`] if any expected segment is
    /// absent (a node that never ran or crashed without reporting) and
    /// with [`MediaError::MergeToolFailure`] if the concatenation itself
    /// errors. On success every intermediate segment is deleted.
    pub async fn merge(
        &self,
        segments: &[PathBuf],
        output: &Path,
        meta: &VideoMetadata,
    ) -> MediaResult<()> {
        for (rank, segment) in segments.iter().enumerate() {
            if !segment.exists() {
                return Err(MediaError::MissingSegment {
                    rank,
                    path: segment.clone(),
                });
            }
        }

        let extension = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_else(|| self.codec.extension());
        let tmp = output.with_extension(format!("tmp.{extension}"));

        if let Err(e) = self.codec.concat(segments, &tmp, meta).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(MediaError::merge_tool_failure(e.to_string()));
        }

        tokio::fs::rename(&tmp, output).await.map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            MediaError::merge_tool_failure(format!(
                "cannot move merge into place at {}: {e}",
                output.display()
            ))
        })?;

        for segment in segments {
            if let Err(e) = tokio::fs::remove_file(segment).await {
                warn!(segment = %segment.display(), "failed to remove segment: {}", e);
            }
        }

        info!(
            segments = segments.len(),
            output = %output.display(),
            "merge complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FramePull, VideoCodec};
    use crate::rawvideo::RawVideoCodec;

    fn meta() -> VideoMetadata {
        VideoMetadata {
            total_frames: 0,
            width: 4,
            height: 2,
            fps: 25.0,
            codec_tag: "rawv".to_string(),
        }
    }

    async fn write_segment(path: &Path, values: &[u8]) {
        let codec = RawVideoCodec;
        let meta = meta();
        let mut sink = codec.create_sink(path, &meta).await.unwrap();
        for &value in values {
            sink.write_frame(&vec![value; meta.frame_size()]).await.unwrap();
        }
        sink.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_merge_concatenates_and_deletes_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        let seg_a = dir.path().join("job_segment_000.rawv");
        let seg_b = dir.path().join("job_segment_001.rawv");
        write_segment(&seg_a, &[1, 2]).await;
        write_segment(&seg_b, &[3]).await;

        let output = dir.path().join("processed.rawv");
        let merger = SegmentMerger::new(Arc::new(RawVideoCodec));
        merger
            .merge(&[seg_a.clone(), seg_b.clone()], &output, &meta())
            .await
            .unwrap();

        assert!(output.exists());
        assert!(!seg_a.exists(), "segments are deleted after the merge");
        assert!(!seg_b.exists());

        let codec = RawVideoCodec;
        let probed = codec.probe(&output).await.unwrap();
        assert_eq!(probed.total_frames, 3);

        let mut source = codec.open_source(&output, &meta(), 0).await.unwrap();
        for expected in 1..=3u8 {
            match source.next_frame().await.unwrap() {
                FramePull::Frame(frame) => assert!(frame.iter().all(|&b| b == expected)),
                other => panic!("expected frame, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_missing_segment_names_the_rank() {
        let dir = tempfile::tempdir().unwrap();
        let seg_a = dir.path().join("job_segment_000.rawv");
        let seg_b = dir.path().join("job_segment_001.rawv");
        write_segment(&seg_a, &[1]).await;
        // seg_b never written.

        let output = dir.path().join("processed.rawv");
        let merger = SegmentMerger::new(Arc::new(RawVideoCodec));
        let err = merger
            .merge(&[seg_a.clone(), seg_b], &output, &meta())
            .await
            .unwrap_err();

        match err {
            MediaError::MissingSegment { rank, .. } => assert_eq!(rank, 1),
            other => panic!("expected MissingSegment, got {other}"),
        }
        assert!(!output.exists(), "no partial merge at the final path");
        assert!(seg_a.exists(), "surviving segments are left for diagnosis");
    }

    #[tokio::test]
    async fn test_corrupt_segment_is_a_merge_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let seg_a = dir.path().join("job_segment_000.rawv");
        write_segment(&seg_a, &[1]).await;

        // A segment with a valid header but a truncated frame body.
        let seg_b = dir.path().join("job_segment_001.rawv");
        write_segment(&seg_b, &[7, 8]).await;
        let full = std::fs::metadata(&seg_b).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&seg_b).unwrap();
        file.set_len(full - 5).unwrap();

        let output = dir.path().join("processed.rawv");
        let merger = SegmentMerger::new(Arc::new(RawVideoCodec));
        let err = merger
            .merge(&[seg_a, seg_b], &output, &meta())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::MergeToolFailure(_)));
        assert!(!output.exists(), "failed merge leaves nothing at the final path");
    }
}
