//! FramePipe worker binary.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fpipe_coord::GroupConfig;
use fpipe_models::{JobDescriptor, ObjectRef};
use fpipe_queue::JobQueue;
use fpipe_storage::{HttpStore, ObjectStore, S3Store};
use fpipe_worker::{JobOrchestrator, QueueListener, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "fpipe-worker")]
#[command(about = "Distributed video-processing worker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one job as one node of the worker group
    Run {
        /// Job identifier
        #[arg(long)]
        job_id: String,

        /// Source object as bucket/key
        #[arg(long)]
        source: String,

        /// Transform task name (invert, grayscale, blur, edge, none)
        #[arg(long)]
        task: String,

        /// Transform parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        /// This node's rank; rank 0 is the coordinator
        #[arg(long, default_value_t = 0)]
        rank: usize,

        /// Total nodes in the group
        #[arg(long, default_value_t = 1)]
        nodes: usize,

        /// Coordinator rendezvous address
        #[arg(long, default_value = "127.0.0.1:7400")]
        coordinator: String,
    },

    /// Consume jobs from the queue (coordinator only)
    Listen {
        /// Total nodes in the group each job runs on
        #[arg(long, default_value_t = 1)]
        nodes: usize,

        /// Coordinator rendezvous address
        #[arg(long, default_value = "127.0.0.1:7400")]
        coordinator: String,
    },
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("fpipe=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// S3 credentials select the S3 client; otherwise objects are fetched over
/// plain HTTP range requests.
fn build_store() -> anyhow::Result<Arc<dyn ObjectStore>> {
    if std::env::var("FPIPE_S3_ENDPOINT_URL").is_ok() {
        Ok(Arc::new(S3Store::from_env()?))
    } else {
        Ok(Arc::new(HttpStore::from_env()?))
    }
}

fn group_config(rank: usize, nodes: usize, coordinator: String, config: &WorkerConfig) -> GroupConfig {
    let mut group = GroupConfig::new(rank, nodes, coordinator);
    group.rendezvous_timeout = config.rendezvous_timeout;
    group.connect_retry_interval = config.connect_retry_interval;
    group
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();

    let store = match build_store() {
        Ok(store) => store,
        Err(e) => {
            error!("failed to configure object store: {}", e);
            std::process::exit(2);
        }
    };

    let orchestrator = JobOrchestrator::new(config.clone(), store);

    match cli.command {
        Command::Run {
            job_id,
            source,
            task,
            params,
            rank,
            nodes,
            coordinator,
        } => {
            let source: ObjectRef = match source.parse() {
                Ok(source) => source,
                Err(e) => {
                    error!("invalid source: {}", e);
                    std::process::exit(2);
                }
            };
            let params = match serde_json::from_str::<serde_json::Value>(&params) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) => {
                    error!("params must be a JSON object");
                    std::process::exit(2);
                }
                Err(e) => {
                    error!("invalid params: {}", e);
                    std::process::exit(2);
                }
            };

            let job = JobDescriptor::new(job_id, source, task).with_params(params);
            let group = group_config(rank, nodes, coordinator, &config);

            match orchestrator.run_job(&job, group).await {
                Ok(report) => {
                    if report.frames_skipped > 0 {
                        warn!(
                            skipped = report.frames_skipped,
                            "completed with skipped frames"
                        );
                    }
                    info!(
                        job_id = %report.job_id,
                        rank = report.rank,
                        frames = report.frames_written,
                        output = ?report.output_path,
                        "job succeeded"
                    );
                }
                Err(e) => {
                    error!("job failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Command::Listen { nodes, coordinator } => {
            let queue = match JobQueue::from_env() {
                Ok(queue) => queue,
                Err(e) => {
                    error!("failed to create job queue: {}", e);
                    std::process::exit(1);
                }
            };

            let group = group_config(0, nodes, coordinator, &config);
            let listener = QueueListener::new(orchestrator, Arc::new(queue), group);

            if let Err(e) = listener.run().await {
                error!("listener error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
