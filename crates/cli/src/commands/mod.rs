//! Command definitions and execution
//!
//! Every operation is one variant of [`Commands`]. The same enum is parsed
//! from command-line arguments by clap and from JSON on stdin by serde, so
//! both forms reach [`dispatch`] as identical typed values.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncReadExt;

use isd_core::{ConfigManager, ConfigOverrides, Result, StoreClient};
use isd_s3::S3Client;

use crate::exit_code::ExitCode;
use crate::input::{self, ConnectionSettings, Request};
use crate::output::{Formatter, OutputConfig};

mod list;
mod metadata;
mod object;
mod upload;

pub use list::{DiskUsageArgs, ListBucketsArgs, ListObjectsArgs};
pub use metadata::{GetMetadataArgs, ReplaceMetadataArgs, SearchMetadataArgs};
pub use object::{CopyArgs, DeleteArgs, DeleteMultArgs, GetObjectArgs};
pub use upload::{UploadArgs, UploadMultArgs};

/// isd_s3 - scripted data management on S3-compatible object storage
///
/// Run one command from the arguments, or pipe a JSON object (or an array
/// of objects) with a "command" field to stdin.
#[derive(Parser, Debug)]
#[command(name = "isd_s3")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags accepted before or after any command
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
#[command(rename_all = "snake_case")]
pub struct GlobalArgs {
    /// Do not print command results
    #[arg(long, visible_alias = "np", global = true)]
    pub noprint: bool,

    /// Indent JSON output
    #[arg(long, visible_alias = "pp", global = true)]
    pub prettyprint: bool,

    /// Use the local AWS credentials instead of the configured credentials file
    #[arg(long, visible_alias = "ul", global = true)]
    pub use_local_config: bool,

    /// Object store endpoint
    #[arg(long, global = true)]
    pub s3_url: Option<String>,

    /// Bucket used when a command names none
    #[arg(long, global = true)]
    pub default_bucket: Option<String>,

    /// AWS credentials file
    #[arg(long, global = true)]
    pub credentials_file: Option<PathBuf>,

    /// Configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable colored diagnostics
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl GlobalArgs {
    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            use_local_config: self.use_local_config.then_some(true),
            s3_url: self.s3_url.clone(),
            default_bucket: self.default_bucket.clone(),
            credentials_file: self.credentials_file.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq, Deserialize)]
#[command(rename_all = "snake_case")]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Commands {
    /// List buckets
    #[command(visible_alias = "lb")]
    #[serde(alias = "lb")]
    ListBuckets(ListBucketsArgs),

    /// List objects under a prefix
    #[command(visible_alias = "lo")]
    #[serde(alias = "lo")]
    ListObjects(ListObjectsArgs),

    /// Total size of the objects under a prefix
    #[command(visible_alias = "du")]
    #[serde(alias = "du")]
    DiskUsage(DiskUsageArgs),

    /// Print an object's metadata
    #[command(visible_alias = "gm")]
    #[serde(alias = "gm")]
    GetMetadata(GetMetadataArgs),

    /// List keys whose metadata contains a given key
    #[command(visible_alias = "sm")]
    #[serde(alias = "sm")]
    SearchMetadata(SearchMetadataArgs),

    /// Upload a file
    #[command(visible_alias = "ul")]
    #[serde(alias = "ul")]
    Upload(UploadArgs),

    /// Upload a directory
    #[command(visible_alias = "um")]
    #[serde(alias = "um")]
    UploadMult(UploadMultArgs),

    /// Download an object
    #[command(visible_alias = "go")]
    #[serde(alias = "go")]
    GetObject(GetObjectArgs),

    /// Delete objects by key
    #[command(visible_alias = "dl")]
    #[serde(alias = "dl")]
    Delete(DeleteArgs),

    /// Delete every object under a prefix
    #[command(visible_alias = "dm")]
    #[serde(alias = "dm")]
    DeleteMult(DeleteMultArgs),

    /// Replace an object's metadata
    #[command(visible_alias = "rm")]
    #[serde(alias = "rm")]
    ReplaceMetadata(ReplaceMetadataArgs),

    /// Copy an object
    #[command(visible_alias = "cp")]
    #[serde(alias = "cp")]
    CopyObject(CopyArgs),

    /// Move every object under a key prefix
    #[command(visible_alias = "mv")]
    #[serde(alias = "mv")]
    MoveObject(CopyArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::ListBuckets(_) => "list_buckets",
            Commands::ListObjects(_) => "list_objects",
            Commands::DiskUsage(_) => "disk_usage",
            Commands::GetMetadata(_) => "get_metadata",
            Commands::SearchMetadata(_) => "search_metadata",
            Commands::Upload(_) => "upload",
            Commands::UploadMult(_) => "upload_mult",
            Commands::GetObject(_) => "get_object",
            Commands::Delete(_) => "delete",
            Commands::DeleteMult(_) => "delete_mult",
            Commands::ReplaceMetadata(_) => "replace_metadata",
            Commands::CopyObject(_) => "copy_object",
            Commands::MoveObject(_) => "move_object",
        }
    }
}

/// A command's serialized result and whether every item in it succeeded
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub value: Value,
    pub success: bool,
}

impl Outcome {
    pub fn ok<T: Serialize>(value: &T) -> Result<Self> {
        Self::with_status(value, true)
    }

    /// A result that may carry per-item failures
    pub fn with_status<T: Serialize>(value: &T, success: bool) -> Result<Self> {
        Ok(Self {
            value: serde_json::to_value(value)?,
            success,
        })
    }
}

/// Run one command against the store
pub async fn dispatch(client: &StoreClient, command: Commands) -> Result<Outcome> {
    tracing::debug!(command = command.name(), "Dispatching command");
    match command {
        Commands::ListBuckets(args) => list::list_buckets(client, args).await,
        Commands::ListObjects(args) => list::list_objects(client, args).await,
        Commands::DiskUsage(args) => list::disk_usage(client, args).await,
        Commands::GetMetadata(args) => metadata::get_metadata(client, args).await,
        Commands::SearchMetadata(args) => metadata::search_metadata(client, args).await,
        Commands::Upload(args) => upload::upload(client, args).await,
        Commands::UploadMult(args) => upload::upload_mult(client, args).await,
        Commands::GetObject(args) => object::get_object(client, args).await,
        Commands::Delete(args) => object::delete(client, args).await,
        Commands::DeleteMult(args) => object::delete_mult(client, args).await,
        Commands::ReplaceMetadata(args) => metadata::replace_metadata(client, args).await,
        Commands::CopyObject(args) => object::copy_object(client, args).await,
        Commands::MoveObject(args) => object::move_object(client, args).await,
    }
}

/// Execute the parsed command line
pub async fn execute(cli: Cli) -> ExitCode {
    let Cli { globals, command } = cli;
    let formatter = Formatter::new(output_config(&globals, None));

    let requests = match command {
        Some(command) => vec![Request::new(command)],
        None => match read_requests().await {
            Ok(Some(requests)) => requests,
            Ok(None) => {
                if let Err(e) = Cli::command().print_help() {
                    formatter.error(&e.to_string());
                }
                return ExitCode::GeneralError;
            }
            Err(e) => {
                formatter.error(&e.to_string());
                return ExitCode::UsageError;
            }
        },
    };

    let connection = match input::merge_connection(globals.connection(), &requests) {
        Ok(connection) => connection,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::UsageError;
        }
    };

    let client = match connect(&connection).await {
        Ok(client) => client,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::GeneralError;
        }
    };

    run_requests(&client, &globals, requests).await
}

/// Run requests in order, printing each result; failures do not stop later requests
pub async fn run_requests(client: &StoreClient, globals: &GlobalArgs, requests: Vec<Request>) -> ExitCode {
    let mut exit_code = ExitCode::Success;
    for Request { command, globals: request_globals } in requests {
        let formatter = Formatter::new(output_config(globals, Some(&request_globals)));
        let name = command.name();
        let code = match dispatch(client, command).await {
            Ok(outcome) => {
                formatter.output(&outcome.value);
                if outcome.success {
                    ExitCode::Success
                } else {
                    formatter.warning(&format!("{name} completed with failures"));
                    ExitCode::GeneralError
                }
            }
            Err(e) => {
                tracing::debug!(command = name, error = ?e, "Command failed");
                formatter.error(&format!("{name}: {e}"));
                ExitCode::GeneralError
            }
        };
        exit_code = exit_code.and(code);
    }
    exit_code
}

fn output_config(globals: &GlobalArgs, request: Option<&input::RequestGlobals>) -> OutputConfig {
    let request = request.cloned().unwrap_or_default();
    OutputConfig {
        noprint: request.noprint.unwrap_or(globals.noprint),
        pretty: request.prettyprint.unwrap_or(globals.prettyprint),
        no_color: request.no_color.unwrap_or(globals.no_color),
    }
}

/// Read JSON requests from stdin; `None` when there is nothing to read
async fn read_requests() -> Result<Option<Vec<Request>>> {
    if std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    input::parse_requests(&text).map(Some)
}

/// Resolve configuration, start logging and open the store session
async fn connect(connection: &ConnectionSettings) -> Result<StoreClient> {
    let manager = match &connection.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let overrides = ConfigOverrides {
        s3_url: connection.s3_url.clone(),
        credentials_file: connection.credentials_file.clone(),
        default_bucket: connection.default_bucket.clone(),
        use_local_config: connection.use_local_config.unwrap_or(false),
    };
    let config = manager.resolve(&overrides)?;
    crate::init_logging(config.log_level.as_deref());
    tracing::debug!(config = %manager.path().display(), s3_url = %config.s3_url, "Resolved configuration");

    let store = S3Client::new(&config).await?;
    Ok(StoreClient::new(Arc::new(store))
        .with_default_bucket(config.default_bucket)
        .with_transfer(config.transfer))
}
