//! Logging initialization for the dispatcher.
//!
//! Thin wrapper over the observability crate: every log line carries the
//! `telemetry-outboxd` service name, and the configured level is the default
//! filter unless `RUST_LOG` is set.

use crate::Config;

/// Service name stamped on every log line.
pub const SERVICE_NAME: &str = "telemetry-outboxd";

/// Initialize logging from the loaded configuration.
///
/// With `log_path` set, logs go to that JSONL file and to stderr; otherwise
/// to stderr only.
///
/// ```ignore
/// let config = Config::load(None)?;
/// init_logging(&config);
/// tracing::info!("dispatcher starting");
/// ```
pub fn init_logging(config: &Config) {
    observability::init_with_config(log_config(config));
}

fn log_config(config: &Config) -> observability::LogConfig {
    observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: config.log_level.clone(),
        log_path: config.log_path.clone(),
        also_stderr: true,
    }
}
