//! Job orchestration: the end-to-end pipeline for one node.
//!
//! Sequence: group rendezvous → acquisition and probe (coordinator only) →
//! manifest broadcast → local frame-range computation → segment processing
//! → segments-written barrier → merge (coordinator only) → job-complete
//! barrier. A fatal coordinator failure before a barrier aborts the group
//! so no worker is ever left hanging.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use fpipe_coord::{GroupConfig, JobManifest, NodeGroup, NodeOutcome, Phase};
use fpipe_media::{codec_for_path, segment_path, FilterEngine, SegmentMerger, SegmentProcessor};
use fpipe_models::{FilterKind, FrameRange, JobDescriptor, JobReport};
use fpipe_storage::{ChunkedDownloader, DownloadConfig, ObjectStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Runs jobs end to end as one node of the worker group.
pub struct JobOrchestrator {
    config: WorkerConfig,
    store: Arc<dyn ObjectStore>,
}

impl JobOrchestrator {
    /// Create an orchestrator over the given object store.
    pub fn new(config: WorkerConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    /// Run one job as the node described by `group_config`.
    ///
    /// Returns this node's [`JobReport`]; `output_path` is populated on the
    /// coordinator after a successful merge. Decode gaps surface as the
    /// report's skip tally, never as a failure.
    pub async fn run_job(
        &self,
        job: &JobDescriptor,
        group_config: GroupConfig,
    ) -> WorkerResult<JobReport> {
        let started = Instant::now();
        let rank = group_config.rank;
        let nodes = group_config.nodes;

        let filter = FilterKind::parse(&job.transform).unwrap_or_else(|| {
            warn!(
                job_id = %job.job_id,
                task = %job.transform,
                "unknown transform, falling back to no-op"
            );
            FilterKind::None
        });

        info!(
            job_id = %job.job_id,
            rank,
            nodes,
            filter = filter.name(),
            source = %job.source,
            "starting job"
        );

        let mut group = NodeGroup::connect(group_config).await?;

        // Acquisition and probe are coordinator-only; a failure there must
        // abort the group before anyone can hang at the broadcast.
        let local_manifest = if group.is_coordinator() {
            match self.acquire_and_probe(job).await {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    group.abort(&format!("acquisition failed: {e}")).await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        let manifest = group.broadcast(local_manifest).await?;

        // Every node derives its own range from the broadcast frame count.
        let range = FrameRange::for_rank(rank, nodes, manifest.metadata.total_frames);
        info!(rank, range = %range, "frame range assigned");

        group.barrier(Phase::SourceReady, NodeOutcome::Ok).await?;

        let codec = codec_for_path(&manifest.artifact_path);
        let segment_dir = manifest
            .artifact_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let segment = segment_path(&segment_dir, &job.job_id, rank, codec.extension());

        let processed = SegmentProcessor::new(Arc::clone(&codec), FilterEngine::from_probe())
            .process(
                &manifest.artifact_path,
                &segment,
                &manifest.metadata,
                range,
                filter,
                rank,
            )
            .await;

        // A failed node short-circuits the whole group here; decode gaps
        // are warnings and pass the barrier.
        let outcome = NodeOutcome::from_result(&processed);
        group.barrier(Phase::SegmentsWritten, outcome).await?;
        let segment_report = processed?;

        // Merge failure is fatal to the job but not an abort: the workers'
        // contributions are complete and they exit cleanly.
        let mut output_path = None;
        let mut merge_error: Option<WorkerError> = None;
        if group.is_coordinator() {
            let segments: Vec<PathBuf> = (0..nodes)
                .map(|r| segment_path(&segment_dir, &job.job_id, r, codec.extension()))
                .collect();
            let final_path = processed_path(&manifest.artifact_path);

            match SegmentMerger::new(Arc::clone(&codec))
                .merge(&segments, &final_path, &manifest.metadata)
                .await
            {
                Ok(()) => output_path = Some(final_path),
                Err(e) => merge_error = Some(e.into()),
            }
        }

        group.barrier(Phase::JobComplete, NodeOutcome::Ok).await?;

        if let Some(e) = merge_error {
            return Err(e);
        }

        let report = JobReport {
            job_id: job.job_id.clone(),
            rank,
            success: true,
            frames_written: segment_report.frames_written,
            frames_skipped: segment_report.frames_skipped,
            output_path,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            job_id = %report.job_id,
            rank,
            frames = report.frames_written,
            skipped = report.frames_skipped,
            elapsed_ms = report.elapsed_ms,
            "job complete"
        );
        Ok(report)
    }

    /// Coordinator-only: chunked download plus metadata probe.
    async fn acquire_and_probe(&self, job: &JobDescriptor) -> WorkerResult<JobManifest> {
        let artifact_path = self.artifact_path(job);

        let downloader = ChunkedDownloader::new(DownloadConfig {
            parts: self.config.download_parts,
            retry_attempts: self.config.download_retries,
        });
        downloader
            .download(Arc::clone(&self.store), &job.source, &artifact_path)
            .await?;

        let codec = codec_for_path(&artifact_path);
        let metadata = codec.probe(&artifact_path).await?;
        info!(
            frames = metadata.total_frames,
            width = metadata.width,
            height = metadata.height,
            fps = metadata.fps,
            "source ready"
        );

        Ok(JobManifest {
            artifact_path,
            metadata,
        })
    }

    /// Local artifact path, named by job id. The source extension is kept
    /// so codec selection survives the copy.
    fn artifact_path(&self, job: &JobDescriptor) -> PathBuf {
        let extension = Path::new(&job.source.key)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        Path::new(&self.config.work_dir).join(format!("video_{}.{extension}", job.job_id))
    }
}

/// The merged output lands at a distinct path next to the artifact and is
/// returned explicitly; the source artifact is never overwritten.
fn processed_path(artifact: &Path) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let extension = artifact
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avi".to_string());
    artifact.with_file_name(format!("{stem}_processed.{extension}"))
}
