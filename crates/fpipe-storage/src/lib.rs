//! Object store access and chunked parallel acquisition.
//!
//! This crate provides:
//! - The [`ObjectStore`] seam: total object size plus inclusive byte-range
//!   fetches, with S3-compatible and plain-HTTP implementations
//! - [`ChunkedDownloader`]: N concurrent range fetches with partial-failure
//!   detection and ordered, atomic reassembly into one local file

pub mod download;
pub mod error;
pub mod http;
pub mod object_store;
pub mod s3;

pub use download::{ChunkedDownloader, DownloadConfig};
pub use error::{StorageError, StorageResult};
pub use http::{HttpStore, HttpStoreConfig};
pub use object_store::{split_ranges, ByteRange, ObjectStore};
pub use s3::{S3Config, S3Store};
