//! Metadata commands: get_metadata, search_metadata, replace_metadata

use clap::Args;
use serde::Deserialize;

use isd_core::{Error, MetadataArg, MetadataSource, Result, StoreClient};

use super::Outcome;

/// Print an object's metadata
#[derive(Args, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct GetMetadataArgs {
    #[arg(short, long)]
    pub key: String,

    #[arg(short, long)]
    pub bucket: Option<String>,
}

/// Find objects whose metadata contains a key
#[derive(Args, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct SearchMetadataArgs {
    /// Metadata key that must be present
    #[arg(short = 'm', long)]
    pub metadata_key: String,

    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Only inspect keys matching this regular expression
    #[arg(long, visible_alias = "re")]
    pub regex: Option<String>,
}

/// Replace all metadata of an object
#[derive(Args, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
pub struct ReplaceMetadataArgs {
    #[arg(short, long)]
    pub key: String,

    #[arg(short, long)]
    pub bucket: Option<String>,

    /// New metadata as a JSON object
    #[arg(long, visible_alias = "md")]
    pub metadata: MetadataArg,
}

pub async fn get_metadata(client: &StoreClient, args: GetMetadataArgs) -> Result<Outcome> {
    let metadata = client
        .get_metadata(args.bucket.as_deref(), &args.key)
        .await?;
    Outcome::ok(&metadata)
}

pub async fn search_metadata(client: &StoreClient, args: SearchMetadataArgs) -> Result<Outcome> {
    let keys = client
        .search_metadata(
            args.bucket.as_deref(),
            args.regex.as_deref(),
            &args.metadata_key,
        )
        .await?;
    Outcome::ok(&keys)
}

pub async fn replace_metadata(client: &StoreClient, args: ReplaceMetadataArgs) -> Result<Outcome> {
    let metadata = match args.metadata.resolve()? {
        MetadataSource::Inline(metadata) => metadata,
        MetadataSource::Script(script) => {
            return Err(Error::InvalidInput(format!(
                "replace_metadata needs inline JSON metadata, not the script {}",
                script.display()
            )));
        }
        MetadataSource::Producer(_) => {
            return Err(Error::InvalidInput(
                "replace_metadata needs inline JSON metadata".to_string(),
            ));
        }
    };
    let result = client
        .replace_metadata(args.bucket.as_deref(), &args.key, metadata)
        .await?;
    Outcome::ok(&result)
}
