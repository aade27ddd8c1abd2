//! Error types for isd-core
//!
//! Every fallible operation in the workspace returns [`Result`]. The
//! variants follow the client's error taxonomy: configuration problems and
//! precondition violations are raised before any network call, integrity
//! failures after upload verification is exhausted, and transport errors
//! are passed through from the store adapter.

use thiserror::Error;

/// Result type alias for isd-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the object-store client layer
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (e.g. no bucket resolvable)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or contradictory arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An operation's precondition does not hold (empty key set, no source match)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Uploaded content does not match the locally computed ETag
    #[error(
        "Integrity check failed for {key}: expected ETag {expected}, store reported {actual} (after {attempts} attempt(s))"
    )]
    Integrity {
        key: String,
        expected: String,
        actual: String,
        attempts: u32,
    },

    /// Object or bucket not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication or authorization failure
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Network or protocol error reported by the store
    #[error("Network error: {0}")]
    Network(String),

    /// External metadata script failed or produced unusable output
    #[error("Metadata script error: {0}")]
    Script(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether the error is a configuration-level failure that must abort a batch
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Whether the error is an upload integrity mismatch
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity { .. })
    }
}
