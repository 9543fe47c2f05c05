//! Logging configuration and initialization.
//!
//! Progress and warnings go to stderr through `tracing`, keeping stdout free
//! for command results. An optional JSON log file records the same events.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

/// Initialize logging for the CLI.
///
/// `RUST_LOG` wins when set; otherwise the filter follows the verbosity and
/// quiet flags.
pub fn init_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbosity, quiet)))
        .map_err(|e| Error::Config(format!("invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    let installed = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .json();
            tracing::subscriber::set_global_default(subscriber.with(file_layer))
        }
        None => tracing::subscriber::set_global_default(subscriber),
    };
    installed.map_err(|e| Error::Other(format!("failed to install logger: {}", e)))
}

fn default_filter(verbosity: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_string();
    }

    match verbosity {
        0 => "jira2gh=info,j2g=info".to_string(),
        1 => "jira2gh=debug,j2g=debug".to_string(),
        2 => "jira2gh=debug,j2g=debug,ureq=debug".to_string(),
        _ => "jira2gh=trace,j2g=trace,ureq=trace".to_string(),
    }
}

/// Initialize logging for tests with the test writer.
pub fn init_test_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("jira2gh=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}
