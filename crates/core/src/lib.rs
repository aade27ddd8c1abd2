//! isd-core: Core library for the isd_s3 object-store client
//!
//! This crate provides everything except the wire protocol:
//! - Configuration resolution and the error taxonomy
//! - The `ObjectStore` capability trait and its records
//! - Listing pagination, key filtering and block-size parsing
//! - Content hashing and upload verification with retry
//! - Metadata interpretation and directory batch uploads
//! - The `StoreClient` façade the CLI dispatches to
//!
//! The S3 SDK lives in the isd-s3 crate, which implements `ObjectStore`.

pub mod block_size;
pub mod checksum;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod pagination;
pub mod retry;
pub mod traits;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use block_size::parse_block_size;
pub use client::{
    CopyOptions, CopyResult, DeleteReport, DiskUsage, DownloadResult, KeyFailure, ListObjectsOptions,
    Listing, MoveReport, MovedObject, StoreClient, UploadRequest, UploadResult,
};
pub use config::{Config, ConfigFile, ConfigManager, ConfigOverrides, StaticCredentials};
pub use error::{Error, Result};
pub use metadata::{Metadata, MetadataArg, MetadataSource};
pub use retry::{RetryConfig, UPLOAD_VERIFY_ATTEMPTS, is_retryable_error, retry_with_backoff};
pub use traits::{
    BucketInfo, CopyRequest, ListPage, ListRequest, ObjectHead, ObjectInfo, ObjectStore,
    PutOptions, TransferConfig,
};
pub use uploader::{BatchReport, BatchUploadOptions, PlannedUpload, UploadFailure};
