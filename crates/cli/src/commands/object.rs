//! Object commands: get_object, delete, delete_mult, copy_object, move_object

use std::path::PathBuf;

use clap::Args;
use serde::{Deserialize, Deserializer};

use isd_core::{CopyOptions, Error, MetadataArg, MetadataSource, Result, StoreClient};

use super::Outcome;

/// Download an object
#[derive(Args, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct GetObjectArgs {
    #[arg(short, long)]
    pub key: String,

    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Directory to download into
    #[arg(long, visible_alias = "ld", default_value = ".")]
    #[serde(default = "current_dir")]
    pub local_dir: PathBuf,

    /// Local file name; defaults to the last segment of the key
    #[arg(long, visible_alias = "lf")]
    pub local_filename: Option<String>,
}

fn current_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Delete one or more objects
#[derive(Args, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct DeleteArgs {
    /// Keys to delete
    #[arg(short, long, num_args = 1.., required = true)]
    #[serde(alias = "keys", deserialize_with = "one_or_many")]
    pub key: Vec<String>,

    #[arg(short, long)]
    pub bucket: Option<String>,

    #[arg(long, visible_alias = "dr")]
    #[serde(default)]
    pub dry_run: bool,
}

/// Delete every object under a prefix
#[derive(Args, Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct DeleteMultArgs {
    /// Prefix of the keys to delete
    #[arg(default_value = "")]
    #[serde(default)]
    pub prefix: String,

    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Only delete keys matching this regular expression
    #[arg(long, visible_alias = "re")]
    pub regex: Option<String>,

    /// Also delete keys in sub-prefixes
    #[arg(short, long)]
    #[serde(default)]
    pub recursive: bool,

    #[arg(long, visible_alias = "dr")]
    #[serde(default)]
    pub dry_run: bool,
}

/// Source and destination of a copy or move
#[derive(Args, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct CopyArgs {
    #[arg(long, visible_alias = "sk")]
    pub source_key: String,

    #[arg(long, visible_alias = "dk")]
    pub dest_key: String,

    /// Defaults to the configured default bucket
    #[arg(long, visible_alias = "sb")]
    pub source_bucket: Option<String>,

    /// Defaults to the source bucket
    #[arg(long, visible_alias = "db")]
    pub dest_bucket: Option<String>,

    /// Replace the destination metadata with this JSON object
    #[arg(long, visible_alias = "md")]
    pub metadata: Option<MetadataArg>,
}

impl CopyArgs {
    fn into_options(self) -> Result<CopyOptions> {
        let metadata = match self.metadata.map(MetadataArg::resolve).transpose()? {
            None => None,
            Some(MetadataSource::Inline(metadata)) => Some(metadata),
            Some(_) => {
                return Err(Error::InvalidInput(
                    "copy and move need inline JSON metadata".to_string(),
                ));
            }
        };
        Ok(CopyOptions {
            source_key: self.source_key,
            dest_key: self.dest_key,
            source_bucket: self.source_bucket,
            dest_bucket: self.dest_bucket,
            metadata,
        })
    }
}

/// Accept a single key or a list of keys
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(key) => vec![key],
        OneOrMany::Many(keys) => keys,
    })
}

pub async fn get_object(client: &StoreClient, args: GetObjectArgs) -> Result<Outcome> {
    let result = client
        .get_object(
            args.bucket.as_deref(),
            &args.key,
            &args.local_dir,
            args.local_filename.as_deref(),
        )
        .await?;
    Outcome::ok(&result)
}

pub async fn delete(client: &StoreClient, args: DeleteArgs) -> Result<Outcome> {
    let report = client
        .delete(args.bucket.as_deref(), &args.key, args.dry_run)
        .await?;
    let success = report.is_success();
    Outcome::with_status(&report, success)
}

pub async fn delete_mult(client: &StoreClient, args: DeleteMultArgs) -> Result<Outcome> {
    let report = client
        .delete_mult(
            args.bucket.as_deref(),
            &args.prefix,
            args.regex.as_deref(),
            args.recursive,
            args.dry_run,
        )
        .await?;
    let success = report.is_success();
    Outcome::with_status(&report, success)
}

pub async fn copy_object(client: &StoreClient, args: CopyArgs) -> Result<Outcome> {
    let result = client.copy_object(&args.into_options()?).await?;
    Outcome::ok(&result)
}

pub async fn move_object(client: &StoreClient, args: CopyArgs) -> Result<Outcome> {
    let report = client.move_object(&args.into_options()?).await?;
    Outcome::ok(&report)
}
