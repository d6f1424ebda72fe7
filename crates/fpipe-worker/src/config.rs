//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Work directory for artifacts and segments (shared across the group)
    pub work_dir: String,
    /// Concurrent range fetches during acquisition
    pub download_parts: usize,
    /// Attempts per range before it counts as failed
    pub download_retries: u32,
    /// Bound on broadcast/barrier waits
    pub rendezvous_timeout: Duration,
    /// Delay between rendezvous connect attempts
    pub connect_retry_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: "/tmp/fpipe".to_string(),
            download_parts: 4,
            download_retries: 3,
            rendezvous_timeout: Duration::from_secs(30),
            connect_retry_interval: Duration::from_millis(250),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("FPIPE_WORK_DIR").unwrap_or_else(|_| "/tmp/fpipe".to_string()),
            download_parts: std::env::var("FPIPE_DOWNLOAD_PARTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            download_retries: std::env::var("FPIPE_DOWNLOAD_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            rendezvous_timeout: Duration::from_secs(
                std::env::var("FPIPE_RENDEZVOUS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            connect_retry_interval: Duration::from_millis(
                std::env::var("FPIPE_CONNECT_RETRY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(250),
            ),
        }
    }
}
