//! The object-store capability and the records it exchanges
//!
//! [`ObjectStore`] is the seam between the client layer and the wire
//! protocol. The core never talks HTTP itself; an adapter crate (isd-s3)
//! implements this trait on top of an SDK, and tests implement it in memory.

use std::path::Path;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metadata::Metadata;

/// Default multipart chunk size and threshold: 25 MiB
pub const DEFAULT_MULTIPART_CHUNKSIZE: u64 = 25 * 1024 * 1024;

/// Smallest part size S3 accepts for all but the last part
pub const MIN_MULTIPART_CHUNKSIZE: u64 = 5 * 1024 * 1024;

/// Default number of concurrent part uploads for one object
pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

/// A bucket as reported by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<Timestamp>,
}

impl BucketInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creation_date: None,
        }
    }
}

/// An object record produced by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key, or the common prefix for directory entries
    pub key: String,

    /// Size in bytes
    pub size_bytes: i64,

    /// ETag without surrounding quotes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// True for common-prefix ("directory") entries of a single-level listing
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_dir: bool,
}

impl ObjectInfo {
    /// A regular object
    pub fn file(key: impl Into<String>, size_bytes: i64) -> Self {
        Self {
            key: key.into(),
            size_bytes,
            etag: None,
            last_modified: None,
            storage_class: None,
            is_dir: false,
        }
    }

    /// A common prefix returned by a delimiter listing
    pub fn dir(prefix: impl Into<String>) -> Self {
        Self {
            is_dir: true,
            ..Self::file(prefix, 0)
        }
    }
}

/// Result of a HEAD request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
    pub metadata: Metadata,
}

/// Parameters for one page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: String,
    /// Group keys by this delimiter (single-level listing)
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: Option<i32>,
}

impl ListRequest {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    pub common_prefixes: Vec<String>,
    /// `None` when the store omitted the truncation indicator
    pub is_truncated: Option<bool>,
    pub next_continuation_token: Option<String>,
}

/// Multipart transfer parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Part size in bytes; files larger than one part are uploaded in parts
    pub multipart_chunksize: u64,
    /// Maximum concurrent part uploads per object
    pub max_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_chunksize: DEFAULT_MULTIPART_CHUNKSIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl TransferConfig {
    /// Number of parts a file of `size` bytes is split into (at least one)
    pub fn part_count(&self, size: u64) -> u64 {
        size.div_ceil(self.multipart_chunksize.max(1)).max(1)
    }
}

/// Extra attributes attached to an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub metadata: Metadata,
    pub content_type: Option<String>,
    pub transfer: TransferConfig,
}

/// A server-side copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyRequest {
    pub source_bucket: String,
    pub source_key: String,
    pub dest_bucket: String,
    pub dest_key: String,
    /// `Some` replaces the destination metadata entirely; `None` copies it
    pub metadata: Option<Metadata>,
}

/// Operations the client layer needs from an S3-compatible store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all buckets visible to the credentials
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Fetch a single listing page
    async fn list_objects_page(&self, request: &ListRequest) -> Result<ListPage>;

    /// Get object attributes and user metadata
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead>;

    /// Upload a local file, returning the ETag reported by the store
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        local_file: &Path,
        options: &PutOptions,
    ) -> Result<Option<String>>;

    /// Download an object to `dest`, returning the number of bytes written
    async fn download_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64>;

    /// Delete a single object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Server-side copy, replacing metadata when the request carries some
    async fn copy_object(&self, request: &CopyRequest) -> Result<()>;
}
