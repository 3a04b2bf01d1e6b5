//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::{DatabaseError, DatabaseResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(DatabaseError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current_version, CURRENT_VERSION
        )));
    }

    if current_version == CURRENT_VERSION {
        debug!(version = current_version, "Schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_telemetry_records(conn)?;
    }
    if current_version < 2 {
        migrate_v2_processed_at(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: outbox table for decoded telemetry records.
///
/// `AUTOINCREMENT` keeps `record_id` strictly increasing even after deletes.
/// `processed` is NULL or 0 until the dispatcher marks the row.
fn migrate_v1_telemetry_records(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: telemetry_records");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS telemetry_records (
            record_id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT,
            recorded_at TEXT,
            latitude REAL,
            longitude REAL,
            altitude_m REAL,
            speed_kph REAL,
            heading_deg REAL,
            battery_mv INTEGER,
            ignition INTEGER,
            raw_payload TEXT,
            processed INTEGER,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_telemetry_records_processed
            ON telemetry_records(processed, record_id);
        ",
    )?;

    record_migration(conn, 1, "telemetry_records")
}

/// V2: stamp the moment a record was marked processed.
fn migrate_v2_processed_at(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: processed_at");

    conn.execute_batch("ALTER TABLE telemetry_records ADD COLUMN processed_at TEXT;")?;

    record_migration(conn, 2, "processed_at")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_on_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);

        conn.execute(
            "INSERT INTO telemetry_records (device_id, processed_at) VALUES ('dev-1', NULL)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, CURRENT_VERSION as i64);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO migrations (version, name) VALUES (?1, 'future')",
            [CURRENT_VERSION + 1],
        )
        .unwrap();

        let result = run_migrations(&conn);
        assert!(matches!(result, Err(DatabaseError::Migration(_))));
    }
}
