//! Configuration for the telemetry outbox dispatcher.
//!
//! Settings are layered: an optional JSON file, then `OUTBOX_*` environment
//! variables, then command-line flags applied by the binary. Required values
//! are checked once by [`Config::validate`] before anything connects.

mod config;
mod error;
mod logging;

pub use config::{
    Config, DEFAULT_LIVENESS_PORT, DEFAULT_LOG_LEVEL, DEFAULT_POOL_SIZE, DEFAULT_TICK_INTERVAL_SECS,
    ENV_CONFIG_PATH,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, SERVICE_NAME};
