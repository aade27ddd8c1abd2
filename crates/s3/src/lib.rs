//! isd-s3: S3 SDK adapter for isd_s3
//!
//! This crate implements the `ObjectStore` trait from isd-core using
//! aws-sdk-s3. It is the only crate in the workspace that talks to the
//! AWS SDK.

pub mod client;

pub use client::S3Client;
