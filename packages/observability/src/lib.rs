//! # Observability
//!
//! Centralized structured logging for the telemetry outbox services.
//!
//! Services call `observability::init_with_config()` once at startup and use
//! standard `tracing` macros everywhere else. They do not know where logs go:
//!
//! - With a `log_path`, every event is written as one JSON line
//!   (timestamp, level, service, pid, target, message, fields) to that file,
//!   append-only, so `tail -f dispatcher.jsonl | jq` works while the process runs.
//! - `also_stderr` adds a compact human-readable stderr layer.
//! - Without a `log_path`, only the compact stderr output is installed.
//!
//! `RUST_LOG` always wins over the configured default level.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "telemetry-outboxd".into(),
//!     default_level: "debug".into(),
//!     log_path: None,
//!     also_stderr: true,
//! });
//! tracing::info!("dispatcher started");
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;


/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSON log line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file path.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,
}

/// Initialize logging with custom configuration.
///
/// Calling this twice in one process is a no-op for the second call.
pub fn init_with_config(config: LogConfig) {
    if let Some(path) = config.log_path.clone() {
        match file::init_file_subscriber(&config, &path) {
            Ok(()) => return,
            Err(e) => {
                eprintln!(
                    "failed to open log file {}: {}, falling back to stderr",
                    path.display(),
                    e
                );
            }
        }
    }

    use tracing_subscriber::util::SubscriberInitExt;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
        )
        .with_target(true)
        .compact()
        .with_writer(std::io::stderr)
        .finish()
        .try_init();
}
