//! Batch reader: pulls the next window of pending records.

use crate::error::{OutboxError, OutboxResult};
use crate::store::OutboxStore;
use outbox_database::TelemetryRecord;
use std::sync::Arc;
use tracing::{debug, error};

/// Default number of records read per cycle.
pub const DEFAULT_READ_LIMIT: usize = 1000;

pub struct BatchReader {
    store: Arc<dyn OutboxStore>,
    limit: usize,
}

impl BatchReader {
    pub fn new(store: Arc<dyn OutboxStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Fetch up to `limit` pending records, oldest first.
    ///
    /// An empty result is not an error. Any store failure maps to
    /// [`OutboxError::SourceUnavailable`].
    pub async fn read(&self) -> OutboxResult<Vec<TelemetryRecord>> {
        match self.store.fetch_pending(self.limit).await {
            Ok(records) => {
                debug!(count = records.len(), limit = self.limit, "Read pending records");
                Ok(records)
            }
            Err(e) => {
                error!(error = %e, "Failed to read pending records");
                Err(OutboxError::SourceUnavailable(e))
            }
        }
    }
}
