//! Commit marker: marks delivered records processed in bounded chunks.

use crate::error::{OutboxError, OutboxResult};
use crate::store::OutboxStore;
use std::sync::Arc;
use tracing::{debug, error};

/// Default number of ids per UPDATE statement.
pub const DEFAULT_COMMIT_CHUNK_SIZE: usize = 500;

/// Largest chunk one UPDATE statement can bind.
pub const MAX_COMMIT_CHUNK_SIZE: usize = outbox_database::queries::MAX_MARK_IDS;

pub struct CommitMarker {
    store: Arc<dyn OutboxStore>,
    chunk_size: usize,
}

impl CommitMarker {
    /// `chunk_size` is clamped to `1..=MAX_COMMIT_CHUNK_SIZE`.
    pub fn new(store: Arc<dyn OutboxStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.clamp(1, MAX_COMMIT_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Mark `ids` processed, one statement per chunk.
    ///
    /// Returns the summed affected-row count. Ids that are already processed
    /// count zero. On a failing chunk, later chunks are not attempted and the
    /// error carries the rows committed so far.
    pub async fn mark_processed(&self, ids: &[i64]) -> OutboxResult<usize> {
        let mut committed = 0;

        for (index, chunk) in ids.chunks(self.chunk_size).enumerate() {
            match self.store.mark_processed(chunk).await {
                Ok(updated) => {
                    debug!(chunk = index, ids = chunk.len(), updated, "Committed chunk");
                    committed += updated;
                }
                Err(source) => {
                    error!(
                        chunk = index,
                        ids = chunk.len(),
                        committed,
                        error = %source,
                        "Commit chunk failed"
                    );
                    return Err(OutboxError::Commit { committed, source });
                }
            }
        }

        Ok(committed)
    }
}
