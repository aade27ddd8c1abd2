//! Listing commands: list_buckets, list_objects, disk_usage

use clap::Args;
use serde::Deserialize;

use isd_core::{ListObjectsOptions, Result, StoreClient};

use super::Outcome;

/// List the buckets visible to the configured credentials
#[derive(Args, Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct ListBucketsArgs {
    /// Only return bucket names
    #[arg(long, visible_alias = "bo")]
    #[serde(default)]
    pub buckets_only: bool,
}

/// List objects in a bucket
#[derive(Args, Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct ListObjectsArgs {
    /// Only list keys starting with this prefix
    #[arg(default_value = "")]
    #[serde(default)]
    pub prefix: String,

    /// Bucket to list; defaults to the configured default bucket
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Keep only keys matching this regular expression
    #[arg(long, visible_alias = "re")]
    pub regex: Option<String>,

    /// List one directory level below the prefix, like `ls`
    #[arg(long)]
    #[serde(default, alias = "single_level")]
    pub ls: bool,

    /// Only return object keys
    #[arg(long, visible_alias = "ko")]
    #[serde(default)]
    pub keys_only: bool,
}

/// Total size of the objects under a prefix
#[derive(Args, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct DiskUsageArgs {
    /// Only count keys starting with this prefix
    #[arg(default_value = "")]
    #[serde(default)]
    pub prefix: String,

    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Only count keys matching this regular expression
    #[arg(long, visible_alias = "re")]
    pub regex: Option<String>,

    /// Unit to report in, e.g. 1MB, 512KB, 1GB
    #[arg(long, visible_alias = "bs", default_value = DEFAULT_BLOCK_SIZE)]
    #[serde(default = "default_block_size")]
    pub block_size: String,
}

const DEFAULT_BLOCK_SIZE: &str = "1MB";

fn default_block_size() -> String {
    DEFAULT_BLOCK_SIZE.to_string()
}

pub async fn list_buckets(client: &StoreClient, args: ListBucketsArgs) -> Result<Outcome> {
    if args.buckets_only {
        Outcome::ok(&client.bucket_names().await?)
    } else {
        Outcome::ok(&client.list_buckets().await?)
    }
}

pub async fn list_objects(client: &StoreClient, args: ListObjectsArgs) -> Result<Outcome> {
    let options = ListObjectsOptions {
        prefix: args.prefix,
        regex: args.regex,
        single_level: args.ls,
        keys_only: args.keys_only,
    };
    let listing = client
        .list_objects(args.bucket.as_deref(), &options)
        .await?;
    Outcome::ok(&listing)
}

pub async fn disk_usage(client: &StoreClient, args: DiskUsageArgs) -> Result<Outcome> {
    let usage = client
        .disk_usage(
            args.bucket.as_deref(),
            &args.prefix,
            args.regex.as_deref(),
            &args.block_size,
        )
        .await?;
    Outcome::ok(&usage)
}
