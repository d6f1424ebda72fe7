//! Queue intake loop.
//!
//! Runs on the coordinator: consume one job descriptor at a time, run it to
//! completion across the worker group, then acknowledge. Worker ranks are
//! launched by the deployment and rendezvous per job.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use fpipe_coord::GroupConfig;
use fpipe_queue::JobQueue;

use crate::error::WorkerResult;
use crate::orchestrator::JobOrchestrator;

/// Consumes jobs from the queue and drives the orchestrator.
pub struct QueueListener {
    orchestrator: JobOrchestrator,
    queue: Arc<JobQueue>,
    group_template: GroupConfig,
    consumer_name: String,
}

impl QueueListener {
    /// Create a listener; `group_template` describes the per-job group
    /// layout (rank 0, node count, rendezvous address).
    pub fn new(
        orchestrator: JobOrchestrator,
        queue: Arc<JobQueue>,
        group_template: GroupConfig,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            group_template,
            consumer_name: format!("fpipe-worker-{}", Uuid::new_v4()),
        }
    }

    /// Consume and process jobs until the process is stopped.
    pub async fn run(&self) -> WorkerResult<()> {
        self.queue.init().await?;
        info!(consumer = %self.consumer_name, "listening for jobs");

        loop {
            let jobs = match self.queue.consume(&self.consumer_name, 1000, 1).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!("queue consume failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            for (message_id, job) in jobs {
                let result = self
                    .orchestrator
                    .run_job(&job, self.group_template.clone())
                    .await;

                match result {
                    Ok(report) => {
                        if report.frames_skipped > 0 {
                            warn!(
                                job_id = %job.job_id,
                                skipped = report.frames_skipped,
                                "job succeeded with skipped frames"
                            );
                        }
                        info!(
                            job_id = %job.job_id,
                            output = ?report.output_path,
                            "job succeeded"
                        );
                        if let Err(e) = self.queue.ack(&message_id).await {
                            error!(job_id = %job.job_id, "failed to ack job: {}", e);
                        }
                        self.queue.clear_dedup(&job).await.ok();
                    }
                    Err(e) => {
                        error!(job_id = %job.job_id, "job failed: {}", e);

                        let retries = self
                            .queue
                            .increment_retry(&message_id)
                            .await
                            .unwrap_or(u32::MAX);
                        if retries >= self.queue.max_retries() {
                            warn!(
                                job_id = %job.job_id,
                                retries,
                                "retries exhausted, moving job to DLQ"
                            );
                            if let Err(dlq_err) =
                                self.queue.dlq(&message_id, &job, &e.to_string()).await
                            {
                                error!(job_id = %job.job_id, "failed to DLQ job: {}", dlq_err);
                            }
                            self.queue.clear_dedup(&job).await.ok();
                        }
                        // Otherwise the stream redelivers the job after the
                        // visibility timeout.
                    }
                }
            }
        }
    }
}
