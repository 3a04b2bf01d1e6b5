//! Source store contract used by the reader and the commit marker.

use async_trait::async_trait;
use outbox_database::{DatabaseResult, TelemetryDatabase, TelemetryRecord};

/// Query and update capability over the outbox table.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Up to `limit` records that are not processed, ascending by `record_id`.
    async fn fetch_pending(&self, limit: usize) -> DatabaseResult<Vec<TelemetryRecord>>;

    /// Mark one bounded chunk of ids processed; returns rows changed.
    async fn mark_processed(&self, ids: &[i64]) -> DatabaseResult<usize>;
}

#[async_trait]
impl OutboxStore for TelemetryDatabase {
    async fn fetch_pending(&self, limit: usize) -> DatabaseResult<Vec<TelemetryRecord>> {
        TelemetryDatabase::fetch_pending(self, limit).await
    }

    async fn mark_processed(&self, ids: &[i64]) -> DatabaseResult<usize> {
        TelemetryDatabase::mark_processed(self, ids.to_vec()).await
    }
}
