//! JSON command input
//!
//! stdin may hold one command object or an array of them. Each object names
//! its operation in `command` (full name or alias); the remaining fields are
//! that operation's arguments, except for the global fields below, which
//! are taken out before the command is deserialized.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

use isd_core::{Error, Result};

use crate::commands::Commands;

/// Fields that configure the run rather than the command
pub const GLOBAL_FIELDS: [&str; 8] = [
    "noprint",
    "prettyprint",
    "no_color",
    "use_local_config",
    "s3_url",
    "default_bucket",
    "credentials_file",
    "config",
];

/// Settings that select the store session
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionSettings {
    pub use_local_config: Option<bool>,
    pub s3_url: Option<String>,
    pub default_bucket: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl ConnectionSettings {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fill every unset field from `other`
    fn or(self, other: ConnectionSettings) -> ConnectionSettings {
        ConnectionSettings {
            use_local_config: self.use_local_config.or(other.use_local_config),
            s3_url: self.s3_url.or(other.s3_url),
            default_bucket: self.default_bucket.or(other.default_bucket),
            credentials_file: self.credentials_file.or(other.credentials_file),
            config: self.config.or(other.config),
        }
    }
}

/// Global fields found in one JSON command
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestGlobals {
    pub noprint: Option<bool>,
    pub prettyprint: Option<bool>,
    pub no_color: Option<bool>,
    #[serde(flatten)]
    pub connection: ConnectionSettings,
}

/// One command to run, with its own output settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Commands,
    pub globals: RequestGlobals,
}

impl Request {
    pub fn new(command: Commands) -> Self {
        Self {
            command,
            globals: RequestGlobals::default(),
        }
    }
}

/// Parse stdin text into requests, in order
pub fn parse_requests(text: &str) -> Result<Vec<Request>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::InvalidInput(format!("stdin is not valid JSON: {e}")))?;
    let requests = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                parse_request(item).map_err(|e| Error::InvalidInput(format!("command {i}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?,
        other => vec![parse_request(other)?],
    };
    if requests.is_empty() {
        return Err(Error::InvalidInput("no commands given".to_string()));
    }
    Ok(requests)
}

/// Split one JSON command object into its globals and its typed command
pub fn parse_request(value: Value) -> Result<Request> {
    let mut fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(Error::InvalidInput(format!(
                "a command must be a JSON object, got {other}"
            )));
        }
    };

    let globals: Map<String, Value> = GLOBAL_FIELDS
        .iter()
        .filter_map(|name| fields.remove_entry(*name))
        .collect();
    let globals: RequestGlobals = serde_json::from_value(Value::Object(globals))
        .map_err(|e| Error::InvalidInput(format!("invalid global field: {e}")))?;
    let command: Commands = serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::InvalidInput(e.to_string()))?;

    Ok(Request { command, globals })
}

/// Combine command-line connection settings with those of the requests.
///
/// Command-line values win. Requests that set connection fields must agree,
/// since one session serves them all.
pub fn merge_connection(cli: ConnectionSettings, requests: &[Request]) -> Result<ConnectionSettings> {
    let mut from_requests: Option<&ConnectionSettings> = None;
    for request in requests {
        let settings = &request.globals.connection;
        if settings.is_empty() {
            continue;
        }
        match from_requests {
            Some(first) if first != settings => {
                return Err(Error::InvalidInput(
                    "commands in one input must use the same connection settings".to_string(),
                ));
            }
            Some(_) => {}
            None => from_requests = Some(settings),
        }
    }
    Ok(cli.or(from_requests.cloned().unwrap_or_default()))
}
