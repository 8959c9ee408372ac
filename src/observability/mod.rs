//! Logging initialisation.
//!
//! The library only emits `tracing` events and `metrics` counters; a
//! process that wants to see them installs a subscriber once, typically
//! from `main`, through [`init`]. No metrics exporter is installed here.

use crate::config::{LogFormat, LoggingSettings};
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "QUERYSMITH_LOG";

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Builds the event filter.
///
/// Precedence: `QUERYSMITH_LOG`, then `RUST_LOG`, then `debug` when
/// `verbose`, then the configured level.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for an invalid filter directive.
pub fn build_filter(settings: &LoggingSettings, verbose: bool) -> Result<EnvFilter> {
    let directive = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| {
            if verbose {
                "debug".to_string()
            } else {
                settings.level.clone()
            }
        });
    EnvFilter::try_new(&directive)
        .map_err(|e| Error::Configuration(format!("invalid log filter '{directive}': {e}")))
}

/// Installs the global subscriber.
///
/// Events go to stderr, or are appended to `settings.file` when set.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a subscriber is already installed
/// or the log file cannot be opened, and [`Error::Configuration`] for an
/// invalid filter.
pub fn init(settings: &LoggingSettings, verbose: bool) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(init_failed("observability already initialized"));
    }

    let filter = build_filter(settings, verbose)?;
    let to_file = settings.file.is_some();
    let writer = match &settings.file {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_log_file(path)?)),
        None => BoxMakeWriter::new(io::stderr),
    };

    let installed = match settings.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(true)
                    .with_target(true),
            )
            .with(filter)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(!to_file)
                    .with_target(to_file),
            )
            .with(filter)
            .try_init(),
    };
    installed.map_err(|e| init_failed(&e.to_string()))?;

    OBSERVABILITY_INIT
        .set(())
        .map_err(|()| init_failed("failed to mark observability initialized"))
}

/// Opens `path` for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
}

fn init_failed(cause: &str) -> Error {
    Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: cause.to_string(),
    }
}
