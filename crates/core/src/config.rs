//! Configuration management
//!
//! Three values drive the client: the store endpoint, the credentials file
//! and the default bucket. Each is resolved independently with the
//! precedence explicit argument > environment variable > configuration file
//! > built-in default. The configuration file is TOML:
//!
//! ```toml
//! [default]
//! s3_url = "https://stratus.ucar.edu"
//! credentials = "/glade/u/home/rdadata/.aws/credentials"
//! bucket = "rda-data"
//!
//! [transfer]
//! multipart_chunksize = 26214400
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::{MIN_MULTIPART_CHUNKSIZE, TransferConfig};

/// Endpoint used when nothing else is configured
pub const DEFAULT_S3_URL: &str = "https://stratus.ucar.edu";

/// Signing region used when nothing else is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Environment variable overriding the endpoint
pub const ENV_S3_URL: &str = "S3_URL";

/// Environment variable naming the shared credentials file
pub const ENV_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";

/// Environment variable naming the default bucket
pub const ENV_DEFAULT_BUCKET: &str = "ISD_S3_DEFAULT_BUCKET";

/// Environment variable pointing at an alternative configuration file
pub const ENV_CONFIG_FILE: &str = "ISD_S3_CONFIG";

/// On-disk configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub default: DefaultSection,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[default]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSection {
    pub s3_url: Option<String>,
    pub credentials: Option<PathBuf>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Inline access key; takes priority over the credentials file
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive such as `info` or `isd_core=debug`
    pub level: Option<String>,
}

/// Explicit values from the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub s3_url: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub default_bucket: Option<String>,
    /// Ignore any configured credentials file and use the SDK default chain
    pub use_local_config: bool,
}

/// Static access key pair
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub s3_url: String,
    pub region: String,
    pub credentials_file: Option<PathBuf>,
    pub static_credentials: Option<StaticCredentials>,
    pub default_bucket: Option<String>,
    pub transfer: TransferConfig,
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            s3_url: DEFAULT_S3_URL.to_string(),
            region: DEFAULT_REGION.to_string(),
            credentials_file: None,
            static_credentials: None,
            default_bucket: None,
            transfer: TransferConfig::default(),
            log_level: None,
        }
    }
}

/// Locates, reads and resolves the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Use `$ISD_S3_CONFIG` or `<config dir>/isd_s3/config.toml`
    pub fn new() -> Result<Self> {
        if let Some(path) = non_empty_env(ENV_CONFIG_FILE) {
            return Ok(Self::with_path(path));
        }
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot determine the user config directory".to_string()))?;
        Ok(Self::with_path(dir.join("isd_s3").join("config.toml")))
    }

    /// Use an explicit configuration file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the configuration file; a missing file yields the defaults
    pub fn load_file(&self) -> Result<ConfigFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                Error::Config(format!("invalid config file {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No config file, using defaults");
                Ok(ConfigFile::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Resolve the configuration against the process environment
    pub fn resolve(&self, overrides: &ConfigOverrides) -> Result<Config> {
        let file = self.load_file()?;
        resolve_with(file, overrides, non_empty_env)
    }
}

/// Resolve each value as argument > environment > file > default
pub fn resolve_with<E>(file: ConfigFile, overrides: &ConfigOverrides, env: E) -> Result<Config>
where
    E: Fn(&str) -> Option<String>,
{
    let s3_url = overrides
        .s3_url
        .clone()
        .or_else(|| env(ENV_S3_URL))
        .or(file.default.s3_url)
        .unwrap_or_else(|| DEFAULT_S3_URL.to_string());
    url::Url::parse(&s3_url)
        .map_err(|e| Error::Config(format!("invalid S3 URL '{s3_url}': {e}")))?;

    let credentials_file = if overrides.use_local_config {
        None
    } else {
        overrides
            .credentials_file
            .clone()
            .or_else(|| env(ENV_CREDENTIALS_FILE).map(PathBuf::from))
            .or(file.default.credentials)
    };

    let static_credentials = match (file.default.access_key, file.default.secret_key) {
        _ if overrides.use_local_config => None,
        (Some(access_key), Some(secret_key)) => Some(StaticCredentials {
            access_key,
            secret_key,
        }),
        (None, None) => None,
        _ => {
            return Err(Error::Config(
                "access_key and secret_key must be configured together".to_string(),
            ));
        }
    };

    if file.transfer.multipart_chunksize < MIN_MULTIPART_CHUNKSIZE {
        return Err(Error::Config(format!(
            "transfer.multipart_chunksize must be at least {MIN_MULTIPART_CHUNKSIZE} bytes, got {}",
            file.transfer.multipart_chunksize
        )));
    }

    let default_bucket = overrides
        .default_bucket
        .clone()
        .or_else(|| env(ENV_DEFAULT_BUCKET))
        .or(file.default.bucket);

    Ok(Config {
        s3_url,
        region: file
            .default
            .region
            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        credentials_file,
        static_credentials,
        default_bucket,
        transfer: file.transfer,
        log_level: file.logging.level,
    })
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
