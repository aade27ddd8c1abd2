//! Output formatting
//!
//! Command results are printed to stdout as JSON. Errors and warnings go to
//! stderr so piped output stays parseable.

mod formatter;

pub use formatter::Formatter;

/// How results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Print nothing on success
    pub noprint: bool,
    /// Indent JSON output
    pub pretty: bool,
    /// Disable colored diagnostics
    pub no_color: bool,
}
