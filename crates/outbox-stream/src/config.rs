//! Configuration for the Redis Streams producer.

use crate::error::{StreamError, StreamResult};

/// Default byte ceiling of one wire batch (1 MiB).
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1_048_576;

/// Redis Streams producer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Stream every event is appended to
    pub stream_key: String,

    /// Byte ceiling of one batch; events are packed until the next one would overflow it
    pub max_batch_bytes: usize,

    /// Approximate stream length cap (`XADD MAXLEN ~ n`); `None` keeps everything
    pub max_len: Option<usize>,
}

impl StreamConfig {
    /// Create a config with the default batch ceiling and no length cap.
    pub fn new(redis_url: impl Into<String>, stream_key: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            stream_key: stream_key.into(),
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            max_len: None,
        }
    }

    pub fn with_max_batch_bytes(mut self, max_batch_bytes: usize) -> Self {
        self.max_batch_bytes = max_batch_bytes;
        self
    }

    pub fn with_max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }

    /// Reject values the producer cannot work with.
    pub fn validate(&self) -> StreamResult<()> {
        if self.redis_url.trim().is_empty() {
            return Err(StreamError::Config("redis_url is empty".to_string()));
        }
        if self.stream_key.trim().is_empty() {
            return Err(StreamError::Config("stream_key is empty".to_string()));
        }
        if self.max_batch_bytes == 0 {
            return Err(StreamError::Config(
                "max_batch_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_len == Some(0) {
            return Err(StreamError::Config(
                "max_len must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }
}
