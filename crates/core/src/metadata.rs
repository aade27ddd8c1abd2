//! Object metadata and the metadata interpreter
//!
//! Metadata is a flat string-to-string mapping. Callers describe where it
//! comes from with a [`MetadataArg`] (an inline JSON mapping or a string);
//! it is resolved once, before any upload starts, into a [`MetadataSource`]
//! that yields the metadata for each file.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Flat object metadata
pub type Metadata = BTreeMap<String, String>;

/// Metadata key recording who uploaded the object
pub const UPLOADING_ACCOUNT_KEY: &str = "uploading_account";

/// Metadata key recording the owning institution
pub const INSTITUTION_KEY: &str = "institution";

/// Value injected for [`INSTITUTION_KEY`]
pub const INSTITUTION: &str = "NCAR";

/// Account recorded when the local user cannot be determined
pub const UNKNOWN_ACCOUNT: &str = "unknown";

/// Metadata key holding the whole-file MD5 when requested
pub const CONTENT_MD5_KEY: &str = "ContentMD5";

/// A caller-supplied function producing metadata for a file
pub type MetadataProducer = Arc<dyn Fn(&Path) -> Result<Metadata> + Send + Sync>;

/// Metadata as supplied on the command line or in JSON input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataArg {
    /// A JSON object given directly in JSON input
    Mapping(Map<String, Value>),
    /// A JSON string or the path of a metadata script
    Text(String),
}

impl FromStr for MetadataArg {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(MetadataArg::Text(s.to_string()))
    }
}

impl MetadataArg {
    /// Resolve into a metadata source, failing fast on unusable input
    pub fn resolve(self) -> Result<MetadataSource> {
        match self {
            MetadataArg::Mapping(map) => Ok(MetadataSource::Inline(flatten(map)?)),
            MetadataArg::Text(text) => MetadataSource::parse(&text),
        }
    }
}

/// Where per-file metadata comes from
#[derive(Clone)]
pub enum MetadataSource {
    /// The same mapping for every file
    Inline(Metadata),
    /// An executable called with the file path; its stdout is a JSON mapping
    Script(PathBuf),
    /// A function called with the file path
    Producer(MetadataProducer),
}

impl fmt::Debug for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataSource::Inline(m) => f.debug_tuple("Inline").field(m).finish(),
            MetadataSource::Script(p) => f.debug_tuple("Script").field(p).finish(),
            MetadataSource::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

impl MetadataSource {
    /// Wrap a function as a metadata source
    pub fn producer<F>(f: F) -> Self
    where
        F: Fn(&Path) -> Result<Metadata> + Send + Sync + 'static,
    {
        MetadataSource::Producer(Arc::new(f))
    }

    /// Interpret a metadata string: inline JSON first, then a script path.
    ///
    /// Text that is neither valid JSON nor an existing file is a
    /// configuration error.
    pub fn parse(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(MetadataSource::Inline(flatten(map)?)),
            Ok(other) => Err(Error::InvalidInput(format!(
                "metadata must be a JSON object, got {other}"
            ))),
            Err(json_err) => {
                let path = Path::new(text);
                if path.is_file() {
                    Ok(MetadataSource::Script(path.canonicalize()?))
                } else {
                    Err(Error::Config(format!(
                        "metadata is neither valid JSON ({json_err}) nor an existing script: {text}"
                    )))
                }
            }
        }
    }

    /// Produce the metadata for `file`
    pub async fn metadata_for(&self, file: &Path) -> Result<Metadata> {
        match self {
            MetadataSource::Inline(metadata) => Ok(metadata.clone()),
            MetadataSource::Producer(producer) => producer(file),
            MetadataSource::Script(script) => run_metadata_script(script, file).await,
        }
    }
}

async fn run_metadata_script(script: &Path, file: &Path) -> Result<Metadata> {
    tracing::debug!(script = %script.display(), file = %file.display(), "Running metadata script");

    let output = tokio::process::Command::new(script)
        .arg(file)
        .output()
        .await
        .map_err(|e| Error::Script(format!("failed to run {}: {e}", script.display())))?;

    if !output.status.success() {
        return Err(Error::Script(format!(
            "{} exited with {} for {}: {}",
            script.display(),
            output.status,
            file.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_flat_metadata(&stdout).map_err(|e| {
        Error::Script(format!(
            "{} produced invalid metadata for {}: {e}",
            script.display(),
            file.display()
        ))
    })
}

/// Parse a JSON object into flat metadata
pub fn parse_flat_metadata(json: &str) -> Result<Metadata> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => flatten(map),
        other => Err(Error::InvalidInput(format!(
            "metadata must be a JSON object, got {other}"
        ))),
    }
}

fn flatten(map: Map<String, Value>) -> Result<Metadata> {
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(Error::InvalidInput(format!(
                        "metadata value for '{key}' must be a string, number or boolean, got {other}"
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}

/// Add `uploading_account` and `institution` when absent
pub fn add_required_metadata(metadata: &mut Metadata) {
    add_required_metadata_with(metadata, current_username);
}

fn add_required_metadata_with(metadata: &mut Metadata, username: impl FnOnce() -> Option<String>) {
    if !metadata.contains_key(UPLOADING_ACCOUNT_KEY) {
        let account = username().unwrap_or_else(|| {
            tracing::warn!("Could not determine the local user; recording '{UNKNOWN_ACCOUNT}'");
            UNKNOWN_ACCOUNT.to_string()
        });
        metadata.insert(UPLOADING_ACCOUNT_KEY.to_string(), account);
    }
    metadata
        .entry(INSTITUTION_KEY.to_string())
        .or_insert_with(|| INSTITUTION.to_string());
}

/// Login name of the local session, if the environment exposes one
pub fn current_username() -> Option<String> {
    ["USER", "LOGNAME", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inline_json() {
        let source = MetadataSource::parse(r#"{"dataset": "ds084.1", "version": 2}"#).unwrap();
        match source {
            MetadataSource::Inline(m) => {
                assert_eq!(m["dataset"], "ds084.1");
                assert_eq!(m["version"], "2");
            }
            other => panic!("expected inline metadata, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_nested_values() {
        let err = MetadataSource::parse(r#"{"a": {"b": 1}}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_parse_unknown_text_is_config_error() {
        let err = MetadataSource::parse("/definitely/not/a/script.sh").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_parse_existing_file_is_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("meta.sh");
        std::fs::write(&script, "#!/bin/sh\necho '{}'\n").unwrap();

        let source = MetadataSource::parse(script.to_str().unwrap()).unwrap();
        assert!(matches!(source, MetadataSource::Script(_)));
    }

    #[test]
    fn test_metadata_arg_mapping_resolves_inline() {
        let arg: MetadataArg = serde_json::from_str(r#"{"project": "rda"}"#).unwrap();
        match arg.resolve().unwrap() {
            MetadataSource::Inline(m) => assert_eq!(m["project"], "rda"),
            other => panic!("expected inline metadata, got {other:?}"),
        }

        let arg: MetadataArg = serde_json::from_str(r#""{\"project\": \"rda\"}""#).unwrap();
        assert!(matches!(arg, MetadataArg::Text(_)));
    }

    #[test]
    fn test_metadata_arg_from_str() {
        let arg: MetadataArg = "{}".parse().unwrap();
        assert_eq!(arg, MetadataArg::Text("{}".to_string()));
    }

    #[tokio::test]
    async fn test_inline_is_constant() {
        let source = MetadataSource::parse(r#"{"k": "v"}"#).unwrap();
        let a = source.metadata_for(Path::new("a.txt")).await.unwrap();
        let b = source.metadata_for(Path::new("b.txt")).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_producer_receives_path() {
        let source = MetadataSource::producer(|path| {
            let mut m = Metadata::new();
            m.insert("file".to_string(), path.display().to_string());
            Ok(m)
        });
        let m = source.metadata_for(Path::new("dir/x.nc")).await.unwrap();
        assert_eq!(m["file"], "dir/x.nc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_output_parsed_per_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("meta.sh");
        std::fs::write(&script, "#!/bin/sh\nprintf '{\"source\": \"%s\"}' \"$1\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = MetadataSource::parse(script.to_str().unwrap()).unwrap();
        let m = source.metadata_for(Path::new("data/file1.nc")).await.unwrap();
        assert_eq!(m["source"], "data/file1.nc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_script_is_script_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fail.sh");
        std::fs::write(&script, "#!/bin/sh\necho boom >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = MetadataSource::parse(script.to_str().unwrap()).unwrap();
        let err = source.metadata_for(Path::new("x")).await.unwrap_err();
        assert!(matches!(err, Error::Script(msg) if msg.contains("boom")));
    }

    #[test]
    fn test_add_required_metadata() {
        let mut m = Metadata::new();
        add_required_metadata_with(&mut m, || Some("rdadata".to_string()));
        assert_eq!(m[UPLOADING_ACCOUNT_KEY], "rdadata");
        assert_eq!(m[INSTITUTION_KEY], INSTITUTION);
    }

    #[test]
    fn test_add_required_metadata_keeps_existing() {
        let mut m = Metadata::new();
        m.insert(UPLOADING_ACCOUNT_KEY.to_string(), "someone".to_string());
        m.insert(INSTITUTION_KEY.to_string(), "UCAR".to_string());
        add_required_metadata_with(&mut m, || panic!("lookup not needed"));
        assert_eq!(m[UPLOADING_ACCOUNT_KEY], "someone");
        assert_eq!(m[INSTITUTION_KEY], "UCAR");
    }

    #[test]
    fn test_add_required_metadata_unknown_user() {
        let mut m = Metadata::new();
        add_required_metadata_with(&mut m, || None);
        assert_eq!(m[UPLOADING_ACCOUNT_KEY], UNKNOWN_ACCOUNT);
    }
}
