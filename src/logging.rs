//! Tracing configuration and log routing.
//!
//! Stdout gets a compact formatter. A second layer appends to `PDFQA_LOG_FILE` when it is set,
//! or to `logs/pdfqa.log` otherwise, through a non-blocking writer so socket loops never wait
//! on disk.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "PDFQA_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "pdfqa.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` controls filtering and defaults to `info`.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let path = log_file_path(std::env::var(LOG_FILE_ENV).ok().as_deref());
    match open_file_writer(&path) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

/// Resolve where file logs go, honouring an explicit override.
fn log_file_path(override_path: Option<&str>) -> PathBuf {
    match override_path.map(str::trim).filter(|value| !value.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE),
    }
}

/// Returns `None` when the log file cannot be opened; stdout logging continues regardless.
fn open_file_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
