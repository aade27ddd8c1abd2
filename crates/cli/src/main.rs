//! isd_s3 - command-line client for S3-compatible object storage
//!
//! Runs one command from the arguments, or a sequence of JSON commands
//! piped to stdin, and prints each result as JSON.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod exit_code;
mod input;
mod output;

use commands::Cli;

/// Level used when neither `RUST_LOG` nor the config file sets one
const DEFAULT_LOG_LEVEL: &str = "warn";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = commands::execute(cli).await;

    std::process::exit(exit_code.as_i32());
}

/// Install the tracing subscriber once the configured level is known.
///
/// `RUST_LOG` takes precedence over `level`. Logs go to stderr so stdout
/// only ever carries command results.
pub(crate) fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(DEFAULT_LOG_LEVEL)));

    // A second call (tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
