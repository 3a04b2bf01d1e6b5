//! Bounded connection pool for the outbox database.
//!
//! Thread-safe r2d2 pool over SQLite in WAL mode. WAL lets the dispatcher read
//! pending rows while an ingest process appends new ones.

use crate::{migrations, DatabaseResult};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the database pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections in the pool.
    pub max_size: u32,
    /// Minimum idle connections to maintain.
    pub min_idle: Option<u32>,
    /// Connection acquisition timeout.
    pub connection_timeout: Duration,
    /// SQLite busy timeout; bounds how long a single statement waits on a lock.
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: Some(1),
            connection_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone)]
pub struct PoolState {
    /// Total connections (active + idle).
    pub connections: u32,
    /// Currently idle connections.
    pub idle_connections: u32,
}

/// Thread-safe database connection pool.
pub struct DatabasePool {
    pool: Pool<SqliteConnectionManager>,
    path: String,
}

impl DatabasePool {
    /// Open a pool on the database at `path`.
    ///
    /// This will:
    /// - Create the database file (and parent directory) if missing
    /// - Apply WAL mode and the busy timeout on every new connection
    /// - Run any pending migrations
    pub fn open(path: &Path, config: PoolConfig) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        let busy_timeout_ms = config.busy_timeout.as_millis();

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.execute_batch(&format!(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                PRAGMA busy_timeout = {busy_timeout_ms};
                "
            ))?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout)
            .build(manager)?;

        info!(
            path = %path_str,
            max_size = config.max_size,
            "Database pool created"
        );

        {
            let conn = pool.get()?;
            migrations::run_migrations(&conn)?;
        }

        Ok(Self {
            pool,
            path: path_str,
        })
    }

    /// Get a connection from the pool.
    ///
    /// Blocks until a connection is available or the acquisition timeout
    /// elapses. Connections go back to the pool on drop.
    pub fn get(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Get pool statistics for monitoring.
    pub fn state(&self) -> PoolState {
        let state = self.pool.state();
        PoolState {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check if the pool is healthy by acquiring and releasing a connection.
    pub fn health_check(&self) -> DatabaseResult<()> {
        let conn = self.get()?;
        conn.execute_batch("SELECT 1")?;
        debug!("Database pool health check passed");
        Ok(())
    }
}
