//! Output formatter for command results and diagnostics

use console::Style;
use serde::Serialize;

use super::OutputConfig;

/// Styles for diagnostics on stderr
#[derive(Debug, Clone)]
pub struct Theme {
    /// Error messages - red
    pub error: Style,
    /// Warning messages - yellow
    pub warning: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            error: Style::new().red().for_stderr(),
            warning: Style::new().yellow().for_stderr(),
        }
    }
}

impl Theme {
    /// Returns a theme with no styling (for no-color mode)
    pub fn plain() -> Self {
        Self {
            error: Style::new(),
            warning: Style::new(),
        }
    }
}

/// Formatter for CLI output
///
/// Results are always JSON. `noprint` suppresses results but never errors.
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
    theme: Theme,
}

impl Formatter {
    /// Create a new formatter with the given configuration
    pub fn new(config: OutputConfig) -> Self {
        let theme = if config.no_color {
            Theme::plain()
        } else {
            Theme::default()
        };
        Self { config, theme }
    }

    /// Render a value the way [`Formatter::output`] prints it
    pub fn render<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        if self.config.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }

    /// Print a command result to stdout
    pub fn output<T: Serialize>(&self, value: &T) {
        if self.config.noprint {
            return;
        }
        match self.render(value) {
            Ok(json) => println!("{json}"),
            Err(e) => self.error(&format!("Error serializing output: {e}")),
        }
    }

    /// Output an error message
    ///
    /// Errors are always printed, even with `noprint`.
    pub fn error(&self, message: &str) {
        let label = self.theme.error.apply_to("error:");
        eprintln!("{label} {message}");
    }

    /// Output a warning message
    pub fn warning(&self, message: &str) {
        if self.config.noprint {
            return;
        }
        let label = self.theme.warning.apply_to("warning:");
        eprintln!("{label} {message}");
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}
