//! Chunked parallel object acquisition.
//!
//! Splits an object into N contiguous byte ranges, fetches them
//! concurrently, and reassembles them in range order into one local file.
//! All fetches are joined before judging the outcome, so a single failed
//! range never cancels the others and every failed index is reported
//! together. Nothing is written to disk unless every range succeeded, and
//! the final write is temp-file-then-rename so a partial artifact is never
//! visible at the target path.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use fpipe_models::ObjectRef;

use crate::error::{StorageError, StorageResult};
use crate::object_store::{split_ranges, ByteRange, ObjectStore};

/// Downloader configuration.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Number of concurrent range fetches
    pub parts: usize,
    /// Attempts per range before it counts as failed
    pub retry_attempts: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            parts: 4,
            retry_attempts: 3,
        }
    }
}

impl DownloadConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            parts: std::env::var("FPIPE_DOWNLOAD_PARTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            retry_attempts: std::env::var("FPIPE_DOWNLOAD_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}

/// Chunked parallel downloader over an [`ObjectStore`].
#[derive(Debug, Clone, Default)]
pub struct ChunkedDownloader {
    config: DownloadConfig,
}

impl ChunkedDownloader {
    /// Create a new downloader.
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }

    /// Download `object` to `target`, returning the byte count.
    ///
    /// Fails with [`StorageError::SizeUnknown`] when the remote size cannot
    /// be determined, [`StorageError::PartialFetchFailure`] naming every
    /// range index that failed after retries, or
    /// [`StorageError::WriteFailure`] when the local file cannot be
    /// produced. On failure no file is left at `target`.
    pub async fn download(
        &self,
        store: Arc<dyn ObjectStore>,
        object: &ObjectRef,
        target: &Path,
    ) -> StorageResult<u64> {
        let size = store.object_size(object).await?;
        let ranges = split_ranges(size, self.config.parts);

        info!(
            object = %object,
            size_bytes = size,
            parts = ranges.len(),
            "starting chunked download"
        );

        let mut handles = Vec::with_capacity(ranges.len());
        for range in &ranges {
            let store = Arc::clone(&store);
            let object = object.clone();
            let range = *range;
            let attempts = self.config.retry_attempts;

            handles.push(tokio::spawn(async move {
                fetch_with_retry(store.as_ref(), &object, range, attempts).await
            }));
        }

        // Join everything before judging the outcome: the surviving fetches
        // carry diagnostics even when one range is doomed.
        let mut buffers: Vec<Vec<u8>> = Vec::with_capacity(handles.len());
        let mut failed: Vec<usize> = Vec::new();

        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(buffer)) => buffers.push(buffer),
                Ok(Err(e)) => {
                    warn!(chunk = index, "range fetch failed: {}", e);
                    buffers.push(Vec::new());
                    failed.push(index);
                }
                Err(e) => {
                    warn!(chunk = index, "range fetch task panicked: {}", e);
                    buffers.push(Vec::new());
                    failed.push(index);
                }
            }
        }

        if !failed.is_empty() {
            counter!("fpipe_download_failures_total").increment(failed.len() as u64);
            return Err(StorageError::PartialFetchFailure { failed });
        }

        self.write_atomic(target, &buffers).await?;

        counter!("fpipe_download_bytes_total").increment(size);
        info!(target = %target.display(), size_bytes = size, "download complete");
        Ok(size)
    }

    /// Write all chunk buffers in range order to a temp file, then rename
    /// into place.
    async fn write_atomic(&self, target: &Path, buffers: &[Vec<u8>]) -> StorageResult<()> {
        if let Some(parent) = target.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::write_failure(e.to_string()))?;
            }
        }

        let tmp = target.with_extension("part");

        let result: std::io::Result<()> = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            for buffer in buffers {
                file.write_all(buffer).await?;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::write_failure(e.to_string()));
        }

        tokio::fs::rename(&tmp, target).await.map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            StorageError::write_failure(e.to_string())
        })?;

        Ok(())
    }
}

/// Fetch one range with bounded in-call retries.
///
/// A response whose byte count disagrees with the range length counts as a
/// failed attempt.
async fn fetch_with_retry(
    store: &dyn ObjectStore,
    object: &ObjectRef,
    range: ByteRange,
    attempts: u32,
) -> StorageResult<Vec<u8>> {
    let mut last_error = StorageError::fetch_failed("no fetch attempts made");

    for attempt in 1..=attempts.max(1) {
        match store.fetch_range(object, range).await {
            Ok(buffer) if buffer.len() as u64 == range.len() => {
                debug!(
                    range = %range.header_value(),
                    bytes = buffer.len(),
                    attempt,
                    "range fetched"
                );
                return Ok(buffer);
            }
            Ok(buffer) => {
                last_error = StorageError::fetch_failed(format!(
                    "short read: got {} of {} bytes",
                    buffer.len(),
                    range.len()
                ));
            }
            Err(e) => last_error = e,
        }

        if attempt < attempts {
            debug!(
                range = %range.header_value(),
                attempt,
                "retrying range fetch: {}",
                last_error
            );
            tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
        }
    }

    Err(last_error)
}
