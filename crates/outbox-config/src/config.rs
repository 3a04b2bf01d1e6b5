//! Dispatcher configuration: file, environment, validation.

use crate::{ConfigError, ConfigResult};
use outbox_database::PoolConfig;
use outbox_dispatch::{
    DispatcherConfig, FieldRenames, MissingFieldPolicy, DEFAULT_COMMIT_CHUNK_SIZE,
    DEFAULT_READ_LIMIT, MAX_COMMIT_CHUNK_SIZE,
};
use outbox_stream::{StreamConfig, DEFAULT_MAX_BATCH_BYTES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Environment variable naming the JSON config file.
pub const ENV_CONFIG_PATH: &str = "OUTBOX_CONFIG";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default source connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Default seconds between cycle starts.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;

/// Default liveness probe port.
pub const DEFAULT_LIVENESS_PORT: u16 = 8080;

const REDIS_SCHEMES: &[&str] = &["redis", "rediss", "redis+unix", "unix"];

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite outbox database file.
    pub source_db_path: Option<PathBuf>,
    /// Maximum pooled source connections.
    pub source_pool_size: u32,
    /// Redis connection URL.
    pub redis_url: Option<String>,
    /// Destination stream key.
    pub stream_key: Option<String>,
    /// Byte ceiling of one stream batch.
    pub max_batch_bytes: usize,
    /// Approximate stream length cap.
    pub stream_max_len: Option<usize>,
    /// Records read per cycle.
    pub read_limit: usize,
    /// Ids per commit statement.
    pub commit_chunk_size: usize,
    /// Seconds between cycle starts.
    pub tick_interval_secs: u64,
    /// Liveness probe port.
    pub liveness_port: u16,
    /// Handling of records missing `device_id` or `recorded_at`.
    pub missing_field_policy: MissingFieldPolicy,
    /// Canonical event field name to wire name.
    pub field_renames: BTreeMap<String, String>,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Optional JSONL log file.
    pub log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_db_path: None,
            source_pool_size: DEFAULT_POOL_SIZE,
            redis_url: None,
            stream_key: None,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            stream_max_len: None,
            read_limit: DEFAULT_READ_LIMIT,
            commit_chunk_size: DEFAULT_COMMIT_CHUNK_SIZE,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            liveness_port: DEFAULT_LIVENESS_PORT,
            missing_field_policy: MissingFieldPolicy::default(),
            field_renames: BTreeMap::new(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_path: None,
        }
    }
}

impl Config {
    /// Load from `path` (if given) and then the process environment.
    ///
    /// Does not validate; call [`validate`](Self::validate) after applying
    /// any command-line overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override fields from `OUTBOX_*` variables returned by `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("OUTBOX_SOURCE_DB_PATH") {
            self.source_db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("OUTBOX_SOURCE_POOL_SIZE") {
            self.source_pool_size = parse_env("OUTBOX_SOURCE_POOL_SIZE", &v)?;
        }
        if let Some(v) = var("OUTBOX_REDIS_URL") {
            self.redis_url = Some(v);
        }
        if let Some(v) = var("OUTBOX_STREAM_KEY") {
            self.stream_key = Some(v);
        }
        if let Some(v) = var("OUTBOX_MAX_BATCH_BYTES") {
            self.max_batch_bytes = parse_env("OUTBOX_MAX_BATCH_BYTES", &v)?;
        }
        if let Some(v) = var("OUTBOX_STREAM_MAX_LEN") {
            self.stream_max_len = Some(parse_env("OUTBOX_STREAM_MAX_LEN", &v)?);
        }
        if let Some(v) = var("OUTBOX_READ_LIMIT") {
            self.read_limit = parse_env("OUTBOX_READ_LIMIT", &v)?;
        }
        if let Some(v) = var("OUTBOX_COMMIT_CHUNK_SIZE") {
            self.commit_chunk_size = parse_env("OUTBOX_COMMIT_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = var("OUTBOX_TICK_INTERVAL_SECS") {
            self.tick_interval_secs = parse_env("OUTBOX_TICK_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = var("OUTBOX_LIVENESS_PORT") {
            self.liveness_port = parse_env("OUTBOX_LIVENESS_PORT", &v)?;
        }
        if let Some(v) = var("OUTBOX_MISSING_FIELD_POLICY") {
            self.missing_field_policy = v
                .parse()
                .map_err(|e: String| ConfigError::invalid("OUTBOX_MISSING_FIELD_POLICY", e))?;
        }
        if let Some(v) = var("OUTBOX_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = var("OUTBOX_LOG_PATH") {
            self.log_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Check required values and limits. Fails on the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        self.db_path()?;
        self.redis_url()?;
        self.stream_key()?;

        require_positive("source_pool_size", self.source_pool_size as u64)?;
        require_positive("max_batch_bytes", self.max_batch_bytes as u64)?;
        require_positive("read_limit", self.read_limit as u64)?;
        require_positive("commit_chunk_size", self.commit_chunk_size as u64)?;
        if self.commit_chunk_size > MAX_COMMIT_CHUNK_SIZE {
            return Err(ConfigError::invalid(
                "commit_chunk_size",
                format!("must be at most {MAX_COMMIT_CHUNK_SIZE}"),
            ));
        }
        require_positive("tick_interval_secs", self.tick_interval_secs)?;
        if let Some(max_len) = self.stream_max_len {
            require_positive("stream_max_len", max_len as u64)?;
        }

        self.field_renames()?;
        Ok(())
    }

    pub fn db_path(&self) -> ConfigResult<&Path> {
        match &self.source_db_path {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(ConfigError::Missing("source_db_path")),
        }
    }

    /// The Redis URL, parsed and checked for a Redis scheme.
    pub fn redis_url(&self) -> ConfigResult<Url> {
        let raw = self
            .redis_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("redis_url"))?;
        let url = Url::parse(raw)?;
        if !REDIS_SCHEMES.contains(&url.scheme()) {
            return Err(ConfigError::invalid(
                "redis_url",
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        Ok(url)
    }

    pub fn stream_key(&self) -> ConfigResult<&str> {
        self.stream_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("stream_key"))
    }

    pub fn field_renames(&self) -> ConfigResult<FieldRenames> {
        FieldRenames::new(self.field_renames.clone())
            .map_err(|e| ConfigError::invalid("field_renames", e.to_string()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.source_pool_size,
            ..PoolConfig::default()
        }
    }

    pub fn stream_config(&self) -> ConfigResult<StreamConfig> {
        Ok(StreamConfig::new(self.redis_url()?.as_str(), self.stream_key()?)
            .with_max_batch_bytes(self.max_batch_bytes)
            .with_max_len(self.stream_max_len))
    }

    pub fn dispatcher_config(&self) -> ConfigResult<DispatcherConfig> {
        Ok(DispatcherConfig {
            read_limit: self.read_limit,
            commit_chunk_size: self.commit_chunk_size,
            missing_field_policy: self.missing_field_policy,
            field_renames: self.field_renames()?,
        })
    }
}

fn parse_env<T>(name: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(name, format!("`{value}`: {e}")))
}

fn require_positive(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(())
}
