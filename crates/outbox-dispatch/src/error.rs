//! Outbox dispatch error types.

use crate::transformer::TransformError;
use outbox_database::DatabaseError;
use outbox_stream::StreamError;
use thiserror::Error;

/// Outbox dispatch error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// The source store could not be reached or the pending query failed
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[from] DatabaseError),

    /// A record could not be turned into an event
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// The event stream refused or failed a batch
    #[error("Publish failed: {0}")]
    Publish(#[from] StreamError),

    /// A commit chunk failed after `committed` rows were already marked
    #[error("Commit failed after {committed} rows were marked: {source}")]
    Commit {
        committed: usize,
        #[source]
        source: DatabaseError,
    },

    /// Invalid dispatcher configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
