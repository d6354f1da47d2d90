//! # socks-logging
//!
//! Structured logging with `tracing`.
//!
//! Output goes to stdout and, optionally, to an append-only log file written
//! through a non-blocking `tracing-appender` worker. Third-party crates log
//! at `warn` and above; the socks crates log at the configured level.
//! `RUST_LOG` overrides both when set.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Crates whose level follows the configured setting.
const OWN_CRATES: &[&str] = &["socks", "socks_server", "socks_settings", "socks_logging"];

/// Errors raised while setting up logging.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file (or its directory) could not be prepared.
    #[error("failed to prepare log file {path}: {source}")]
    File {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Keeps the file writer alive. Drop it last, on shutdown, to flush.
#[must_use = "dropping the guard stops the log file writer"]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Parse a level name (`trace`, `debug`, `info`, `warn`, `error`).
pub fn parse_level(level: &str) -> Option<Level> {
    Level::from_str(level.trim()).ok()
}

/// Build the default filter directive for `level`.
///
/// Unknown level names fall back to `info`.
pub fn filter_directive(level: &str) -> String {
    let level = parse_level(level)
        .unwrap_or(Level::INFO)
        .to_string()
        .to_lowercase();
    let mut directive = String::from("warn");
    for krate in OWN_CRATES {
        directive.push_str(&format!(",{krate}={level}"));
    }
    directive
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(level)))
}

/// Initialize the global subscriber with stdout output only.
///
/// Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) -> LogGuard {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stdout)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt_layer)
        .try_init();

    LogGuard { _worker: None }
}

/// Initialize the global subscriber with stdout output AND an append-only
/// log file at `path`.
///
/// The parent directory is created if needed. Existing file content is kept.
pub fn init_subscriber_with_file(level: &str, path: &Path) -> Result<LogGuard, LoggingError> {
    let (dir, file_name) = split_log_path(path)?;
    std::fs::create_dir_all(&dir).map_err(|source| LoggingError::File {
        path: dir.clone(),
        source,
    })?;

    let appender = tracing_appender::rolling::never(&dir, file_name);
    let (writer, worker) = tracing_appender::non_blocking(appender);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stdout)
        .compact();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer);

    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    Ok(LogGuard {
        _worker: Some(worker),
    })
}

/// Split a log path into its directory (cwd when bare) and file name.
fn split_log_path(path: &Path) -> Result<(PathBuf, &std::ffi::OsStr), LoggingError> {
    let file_name = path.file_name().ok_or_else(|| LoggingError::File {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
    })?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
