//! Error types for the event stream producers.

use thiserror::Error;

/// Event stream error type.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Invalid producer configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The producer was closed before the call
    #[error("Producer is closed")]
    Closed,

    /// The backend refused the batch
    #[error("Batch rejected: {0}")]
    Rejected(String),
}

/// Result type for event stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
