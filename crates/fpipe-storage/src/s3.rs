//! S3-compatible object store access.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::Client;
use tracing::{debug, warn};

use fpipe_models::ObjectRef;

use crate::error::{StorageError, StorageResult};
use crate::object_store::{ByteRange, ObjectStore};

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Region ("auto" works for most S3-compatible stores)
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("FPIPE_S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("FPIPE_S3_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("FPIPE_S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("FPIPE_S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("FPIPE_S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("FPIPE_S3_SECRET_ACCESS_KEY not set"))?,
            region: std::env::var("FPIPE_S3_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Object store over the S3 API.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Create a new store from configuration.
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "fpipe",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(S3Config::from_env()?))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn object_size(&self, object: &ObjectRef) -> StorageResult<u64> {
        let head = self
            .client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| {
                warn!(object = %object, "HeadObject failed: {}", e);
                StorageError::SizeUnknown
            })?;

        match head.content_length() {
            Some(len) if len > 0 => Ok(len as u64),
            other => {
                debug!(object = %object, content_length = ?other, "invalid object size");
                Err(StorageError::SizeUnknown)
            }
        }
    }

    async fn fetch_range(&self, object: &ObjectRef, range: ByteRange) -> StorageResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .range(range.header_value())
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(object.to_string())
                } else {
                    StorageError::fetch_failed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::fetch_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }
}
