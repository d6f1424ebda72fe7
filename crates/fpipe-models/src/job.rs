//! Job descriptor and report types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference to an object in the store, written as `bucket/key`.
///
/// The key may itself contain slashes; only the first one separates the
/// bucket. Serializes as the `bucket/key` string, the shape the job queue
/// delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectRef {
    /// Bucket name
    pub bucket: String,
    /// Object key within the bucket
    pub key: String,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Errors from parsing a `bucket/key` string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObjectRefError {
    #[error("object reference must be of the form bucket/key: {0:?}")]
    InvalidFormat(String),
}

impl FromStr for ObjectRef {
    type Err = ObjectRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::new(bucket, key))
            }
            _ => Err(ObjectRefError::InvalidFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for ObjectRef {
    type Error = ObjectRefError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ObjectRef> for String {
    fn from(r: ObjectRef) -> String {
        r.to_string()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// A unit of work delivered by the job queue.
///
/// Immutable once received; one descriptor drives one end-to-end run of the
/// pipeline across the whole worker group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Unique job ID
    pub job_id: String,
    /// Source object to acquire
    pub source: ObjectRef,
    /// Task name selecting the transform (see [`crate::FilterKind::parse`])
    pub transform: String,
    /// Opaque transform parameters
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// When the job was created; stamped on receipt when the producer
    /// omits it
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl JobDescriptor {
    /// Create a new descriptor.
    pub fn new(
        job_id: impl Into<String>,
        source: ObjectRef,
        transform: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            source,
            transform: transform.into(),
            params: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Set transform parameters.
    pub fn with_params(mut self, params: serde_json::Map<String, serde_json::Value>) -> Self {
        self.params = params;
        self
    }

    /// Generate idempotency key for queue deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("job:{}:{}", self.job_id, self.source)
    }
}

/// Final per-node verdict for one job run.
///
/// Returned by every node; `output_path` is populated only on the
/// coordinator after a successful merge. Skipped frames are warnings, not
/// failures, so `success` can be true with a non-zero tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Job this report belongs to
    pub job_id: String,
    /// Rank of the reporting node
    pub rank: usize,
    /// Whether this node's run succeeded
    pub success: bool,
    /// Frames written into this node's segment
    pub frames_written: u64,
    /// Frames skipped due to decode gaps
    pub frames_skipped: u64,
    /// Final merged artifact (coordinator only)
    pub output_path: Option<PathBuf>,
    /// Wall-clock duration of the run in milliseconds
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_parsing() {
        let r: ObjectRef = "uploads/videos/clip.mp4".parse().unwrap();
        assert_eq!(r.bucket, "uploads");
        assert_eq!(r.key, "videos/clip.mp4");
        assert_eq!(r.to_string(), "uploads/videos/clip.mp4");

        assert!("no-slash".parse::<ObjectRef>().is_err());
        assert!("/leading".parse::<ObjectRef>().is_err());
        assert!("trailing/".parse::<ObjectRef>().is_err());
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let job = JobDescriptor::new("job-42", ObjectRef::new("uploads", "in.mp4"), "invert");
        let json = serde_json::to_string(&job).unwrap();
        let back: JobDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, "job-42");
        assert_eq!(back.source, job.source);
        assert_eq!(back.transform, "invert");
    }

    #[test]
    fn test_descriptor_accepts_the_queue_wire_shape() {
        // The intake delivers source as a "bucket/key" string and may omit
        // params and created_at entirely.
        let json = r#"{
            "job_id": "j1",
            "source": "uploads/videos/in.mp4",
            "transform": "blur"
        }"#;
        let job: JobDescriptor = serde_json::from_str(json).unwrap();
        assert!(job.params.is_empty());
        assert_eq!(job.source, ObjectRef::new("uploads", "videos/in.mp4"));

        let back = serde_json::to_value(&job).unwrap();
        assert_eq!(back["source"], "uploads/videos/in.mp4");
    }
}
