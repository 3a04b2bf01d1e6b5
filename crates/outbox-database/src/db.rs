//! Async handle over the pooled outbox database.
//!
//! Every query runs on Tokio's blocking thread pool with a connection checked
//! out of the bounded [`DatabasePool`], so the runtime stays free while SQLite
//! works. Only SQL and light row mapping belong inside [`TelemetryDatabase::call`].
//!
//! ```ignore
//! let db = TelemetryDatabase::open(path, PoolConfig::default()).await?;
//! let pending = db.call(|conn| queries::fetch_pending_records(conn, 100)).await?;
//! ```

use crate::{
    queries, DatabaseError, DatabasePool, DatabaseResult, NewTelemetryRecord, OutboxStats,
    PoolConfig, PoolState, TelemetryRecord,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Cloneable async database handle. Clones share one pool.
#[derive(Clone)]
pub struct TelemetryDatabase {
    pool: Arc<DatabasePool>,
}

impl TelemetryDatabase {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: impl Into<PathBuf>, config: PoolConfig) -> DatabaseResult<Self> {
        let path = path.into();
        let pool = tokio::task::spawn_blocking(move || DatabasePool::open(&path, config))
            .await
            .map_err(|e| DatabaseError::Task(e.to_string()))??;

        info!(path = %pool.path(), "Telemetry database ready");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an already opened pool.
    pub fn from_pool(pool: DatabasePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Run a closure with a pooled connection on the blocking thread pool.
    ///
    /// The caller's task is parked until the closure returns. Acquiring the
    /// connection may wait up to the pool's acquisition timeout.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    /// Up to `limit` unprocessed records in ascending `record_id` order.
    pub async fn fetch_pending(&self, limit: usize) -> DatabaseResult<Vec<TelemetryRecord>> {
        self.call(move |conn| queries::fetch_pending_records(conn, limit))
            .await
    }

    /// Mark `ids` processed in one statement; returns rows changed.
    pub async fn mark_processed(&self, ids: Vec<i64>) -> DatabaseResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.call(move |conn| queries::mark_records_processed(conn, &ids))
            .await
    }

    /// Append records in a single transaction.
    pub async fn insert_records(&self, records: Vec<NewTelemetryRecord>) -> DatabaseResult<Vec<i64>> {
        self.call(move |conn| queries::insert_records(conn, &records))
            .await
    }

    /// Look up one record by id.
    pub async fn get_record(&self, record_id: i64) -> DatabaseResult<Option<TelemetryRecord>> {
        self.call(move |conn| queries::get_record(conn, record_id))
            .await
    }

    pub async fn stats(&self) -> DatabaseResult<OutboxStats> {
        self.call(|conn| queries::outbox_stats(conn)).await
    }

    pub async fn health_check(&self) -> DatabaseResult<()> {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || pool.health_check())
            .await
            .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    pub fn pool_state(&self) -> PoolState {
        self.pool.state()
    }

    pub fn path(&self) -> &Path {
        Path::new(self.pool.path())
    }
}
