//! Plain-HTTP object store access.
//!
//! Resolves `bucket/key` against a base endpoint the way a public or
//! presigned object URL is formed, and speaks ordinary `Range` requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use tracing::{debug, warn};

use fpipe_models::ObjectRef;

use crate::error::{StorageError, StorageResult};
use crate::object_store::{ByteRange, ObjectStore};

/// Configuration for the HTTP store.
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Endpoint the `bucket/key` path is resolved against
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://minio:9000".to_string(),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl HttpStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("FPIPE_STORE_URL")
                .unwrap_or_else(|_| "http://minio:9000".to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("FPIPE_STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}

/// Object store over plain HTTP range requests.
#[derive(Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    /// Create a new store from configuration.
    pub fn new(config: HttpStoreConfig) -> StorageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StorageError::config_error(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(HttpStoreConfig::from_env())
    }

    fn object_url(&self, object: &ObjectRef) -> String {
        format!("{}/{}/{}", self.base_url, object.bucket, object.key)
    }

    /// Size via a `HEAD` request's `Content-Length` header.
    async fn size_from_head(&self, url: &str) -> Option<u64> {
        let response = match self.client.head(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = %r.status(), "HEAD probe rejected");
                return None;
            }
            Err(e) => {
                debug!("HEAD probe failed: {}", e);
                return None;
            }
        };

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&len| len > 0)
    }

    /// Size via a one-byte ranged `GET`, reading the total from
    /// `Content-Range: bytes 0-0/total`. Some endpoints omit or mangle
    /// `Content-Length` on `HEAD`; this probe works wherever range requests
    /// do.
    async fn size_from_range_probe(&self, url: &str) -> Option<u64> {
        let response = match self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await
        {
            Ok(r) if r.status() == StatusCode::PARTIAL_CONTENT => r,
            Ok(r) => {
                debug!(status = %r.status(), "range probe rejected");
                return None;
            }
            Err(e) => {
                debug!("range probe failed: {}", e);
                return None;
            }
        };

        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit_once('/'))
            .and_then(|(_, total)| total.parse::<u64>().ok())
            .filter(|&len| len > 0)
    }
}

#[async_trait]
impl ObjectStore for HttpStore {
    async fn object_size(&self, object: &ObjectRef) -> StorageResult<u64> {
        let url = self.object_url(object);

        if let Some(size) = self.size_from_head(&url).await {
            return Ok(size);
        }
        if let Some(size) = self.size_from_range_probe(&url).await {
            return Ok(size);
        }

        warn!(object = %object, "could not determine remote object size");
        Err(StorageError::SizeUnknown)
    }

    async fn fetch_range(&self, object: &ObjectRef, range: ByteRange) -> StorageResult<Vec<u8>> {
        let url = self.object_url(object);

        let response = self
            .client
            .get(&url)
            .header(RANGE, range.header_value())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::not_found(object.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::fetch_failed(format!(
                "range {} returned status {}",
                range.header_value(),
                status
            )));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
