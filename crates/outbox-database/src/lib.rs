//! SQLite source store for the telemetry outbox.
//!
//! This crate provides:
//! - A bounded r2d2 connection pool with WAL mode ([`DatabasePool`])
//! - An async handle that runs queries on the blocking thread pool ([`TelemetryDatabase`])
//! - Schema migrations
//! - Model types for the `telemetry_records` outbox table
//! - Standalone query helpers that work on any `&Connection`
//!
//! # Outbox table
//!
//! Every row is one decoded telemetry record keyed by a strictly increasing
//! `record_id`. The only column the dispatcher ever writes is `processed`
//! (plus its `processed_at` stamp), and only from not-processed to processed.
//!
//! ```ignore
//! let db = TelemetryDatabase::open(path, PoolConfig::default()).await?;
//! let pending = db.fetch_pending(1000).await?;
//! let marked = db.mark_processed(vec![1, 2, 3]).await?;
//! ```

mod db;
mod error;
mod migrations;
mod models;
mod pool;
pub mod queries;

pub use db::TelemetryDatabase;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::{NewTelemetryRecord, OutboxStats, TelemetryRecord};
pub use pool::{DatabasePool, PoolConfig, PoolState};
