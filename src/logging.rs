//! Tracing setup for the server binary.
//!
//! Events are written to stdout with a compact formatter and mirrored into a log file through a
//! non-blocking writer. `AUDIT_RAG_LOG_FILE` selects an explicit append-only file; without it a
//! daily-rotated file is kept under `logs/`.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,tower_http=info";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_PREFIX: &str = "audit-rag.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

enum LogDestination {
    File(PathBuf),
    RollingDir(PathBuf),
}

impl LogDestination {
    fn from_env() -> Self {
        match std::env::var("AUDIT_RAG_LOG_FILE") {
            Ok(path) if !path.trim().is_empty() => Self::File(PathBuf::from(path)),
            _ => Self::RollingDir(PathBuf::from(DEFAULT_LOG_DIR)),
        }
    }

    fn open(&self) -> std::io::Result<NonBlocking> {
        let (writer, guard) = match self {
            Self::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
            Self::RollingDir(dir) => {
                std::fs::create_dir_all(dir)?;
                tracing_appender::non_blocking(tracing_appender::rolling::daily(
                    dir,
                    DEFAULT_LOG_PREFIX,
                ))
            }
        };
        let _ = LOG_GUARD.set(guard);
        Ok(writer)
    }

    fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::RollingDir(path) => path,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. A log file that cannot be opened only disables the
/// file layer; stdout logging always stays on.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let destination = LogDestination::from_env();
    match destination.open() {
        Ok(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        Err(err) => {
            registry.init();
            tracing::warn!(
                path = %destination.path().display(),
                error = %err,
                "File logging disabled"
            );
        }
    }
}
