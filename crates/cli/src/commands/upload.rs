//! Upload commands: upload, upload_mult

use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;

use isd_core::{BatchUploadOptions, MetadataArg, Result, StoreClient, UploadRequest};

use super::Outcome;

/// Upload a single file
#[derive(Args, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct UploadArgs {
    /// File to upload
    #[arg(long, visible_alias = "lf")]
    pub local_file: PathBuf,

    /// Destination key
    #[arg(short, long)]
    pub key: String,

    #[arg(short, long)]
    pub bucket: Option<String>,

    /// JSON object, or path of a script printing one for the file
    #[arg(long, visible_alias = "md")]
    pub metadata: Option<MetadataArg>,

    /// Record the file's MD5 in the object metadata
    #[arg(long)]
    #[serde(default)]
    pub md5: bool,

    /// Check the stored ETag and upload again on mismatch
    #[arg(long)]
    #[serde(default)]
    pub verify: bool,
}

/// Upload every file of a directory
#[derive(Args, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct UploadMultArgs {
    /// Directory to upload
    #[arg(long, visible_alias = "ld")]
    pub local_dir: PathBuf,

    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Prepended to each file's path relative to the directory
    #[arg(long, visible_alias = "kp", default_value = "")]
    #[serde(default)]
    pub key_prefix: String,

    /// Descend into subdirectories
    #[arg(short, long)]
    #[serde(default)]
    pub recursive: bool,

    /// Print what would be uploaded without uploading
    #[arg(long, visible_alias = "dr")]
    #[serde(default)]
    pub dry_run: bool,

    /// Skip files whose path contains any of these strings
    #[arg(short, long, num_args = 0..)]
    #[serde(default)]
    pub ignore: Vec<String>,

    /// JSON object, or path of a script printing one per file
    #[arg(long, visible_alias = "md")]
    pub metadata: Option<MetadataArg>,

    #[arg(long)]
    #[serde(default)]
    pub md5: bool,

    #[arg(long)]
    #[serde(default)]
    pub verify: bool,

    /// Concurrent uploads; defaults to the number of CPUs
    #[arg(short, long)]
    pub workers: Option<usize>,
}

pub async fn upload(client: &StoreClient, args: UploadArgs) -> Result<Outcome> {
    let metadata = match args.metadata {
        Some(arg) => Some(arg.resolve()?.metadata_for(&args.local_file).await?),
        None => None,
    };
    let result = client
        .upload_object(
            args.bucket.as_deref(),
            UploadRequest {
                local_file: args.local_file,
                key: args.key,
                metadata,
                md5: args.md5,
                verify: args.verify,
            },
        )
        .await?;
    Outcome::ok(&result)
}

pub async fn upload_mult(client: &StoreClient, args: UploadMultArgs) -> Result<Outcome> {
    // Resolved up front so a bad argument fails before the first upload
    let metadata = args.metadata.map(MetadataArg::resolve).transpose()?;
    let options = BatchUploadOptions {
        local_dir: args.local_dir,
        recursive: args.recursive,
        ignore: args.ignore,
        key_prefix: args.key_prefix,
        metadata,
        dry_run: args.dry_run,
        verify: args.verify,
        md5: args.md5,
        workers: args.workers,
    };
    let report = client
        .upload_mult_objects(args.bucket.as_deref(), options)
        .await?;
    let success = report.is_success();
    Outcome::with_status(&report, success)
}
