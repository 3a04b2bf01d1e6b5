//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` (or `&mut Connection` when it needs a
//! transaction) as its first parameter, so they run the same on pooled and
//! plain connections.

use crate::{DatabaseResult, NewTelemetryRecord, OutboxStats, TelemetryRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::{debug, warn};

const RECORD_COLUMNS: &str = "record_id, device_id, recorded_at, latitude, longitude, altitude_m,
     speed_kph, heading_deg, battery_mv, ignition, raw_payload, processed, processed_at, created_at";

const NOT_PROCESSED: &str = "(processed IS NULL OR processed = 0)";

/// Most ids one [`mark_records_processed`] call can bind: SQLite's default
/// limit of 32766 parameters, less the `processed_at` stamp.
pub const MAX_MARK_IDS: usize = 32_765;

// ==========================================
// Ingest
// ==========================================

/// Append one record to the outbox, returning its `record_id`.
pub fn insert_record(conn: &Connection, record: &NewTelemetryRecord) -> DatabaseResult<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO telemetry_records (device_id, recorded_at, latitude, longitude, altitude_m,
             speed_kph, heading_deg, battery_mv, ignition, raw_payload, processed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
    )?;
    stmt.execute(params![
        record.device_id,
        record.recorded_at,
        record.latitude,
        record.longitude,
        record.altitude_m,
        record.speed_kph,
        record.heading_deg,
        record.battery_mv,
        record.ignition,
        record.raw_payload,
    ])?;
    Ok(conn.last_insert_rowid())
}

/// Append many records in one transaction, returning their ids in input order.
pub fn insert_records(
    conn: &mut Connection,
    records: &[NewTelemetryRecord],
) -> DatabaseResult<Vec<i64>> {
    let tx = conn.transaction()?;
    let ids = records
        .iter()
        .map(|record| insert_record(&tx, record))
        .collect::<DatabaseResult<Vec<_>>>()?;
    tx.commit()?;
    debug!(count = ids.len(), "Inserted telemetry records");
    Ok(ids)
}

// ==========================================
// Dispatch
// ==========================================

/// Fetch up to `limit` records that are not processed, oldest `record_id` first.
pub fn fetch_pending_records(conn: &Connection, limit: usize) -> DatabaseResult<Vec<TelemetryRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {RECORD_COLUMNS}
         FROM telemetry_records
         WHERE {NOT_PROCESSED}
         ORDER BY record_id ASC
         LIMIT ?1"
    ))?;

    let records = stmt
        .query_map(params![limit as i64], map_record)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Mark the given records processed in a single UPDATE.
///
/// Only rows that are still not processed are touched, so re-marking an id
/// is a no-op and `processed_at` keeps its first value. Returns the number of
/// rows that changed. Callers keep `ids.len()` at or below [`MAX_MARK_IDS`].
pub fn mark_records_processed(conn: &Connection, ids: &[i64]) -> DatabaseResult<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    let placeholders = (0..ids.len())
        .map(|i| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE telemetry_records
         SET processed = 1, processed_at = ?1
         WHERE record_id IN ({placeholders}) AND {NOT_PROCESSED}"
    );

    let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(ids.len() + 1);
    values.push(now.into());
    values.extend(ids.iter().map(|id| rusqlite::types::Value::Integer(*id)));

    let updated = conn.execute(&sql, params_from_iter(values))?;
    debug!(requested = ids.len(), updated, "Marked records processed");
    Ok(updated)
}

/// Get a record by id.
pub fn get_record(conn: &Connection, record_id: i64) -> DatabaseResult<Option<TelemetryRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {RECORD_COLUMNS} FROM telemetry_records WHERE record_id = ?1"
    ))?;

    match stmt.query_row(params![record_id], map_record) {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ==========================================
// Stats
// ==========================================

/// Count pending and processed records.
pub fn outbox_stats(conn: &Connection) -> DatabaseResult<OutboxStats> {
    let stats = conn.query_row(
        &format!(
            "SELECT
                COALESCE(SUM(CASE WHEN {NOT_PROCESSED} THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN processed = 1 THEN 1 ELSE 0 END), 0),
                MAX(record_id)
             FROM telemetry_records"
        ),
        [],
        |row| {
            Ok(OutboxStats {
                pending: row.get::<_, i64>(0)? as u64,
                processed: row.get::<_, i64>(1)? as u64,
                last_record_id: row.get(2)?,
            })
        },
    )?;
    Ok(stats)
}

// ==========================================
// Helpers
// ==========================================

/// Decode one outbox row.
///
/// SQLite does not enforce column types, so payload columns are read
/// leniently: a value that cannot be read as the column's type is logged and
/// read as `NULL`, leaving the record to the transformer instead of failing
/// the whole query.
fn map_record(row: &Row<'_>) -> rusqlite::Result<TelemetryRecord> {
    let record_id: i64 = row.get(0)?;
    let cols = ColumnReader { row, record_id };

    Ok(TelemetryRecord {
        record_id,
        device_id: cols.text(1, "device_id")?,
        recorded_at: cols.text(2, "recorded_at")?,
        latitude: cols.real(3, "latitude")?,
        longitude: cols.real(4, "longitude")?,
        altitude_m: cols.real(5, "altitude_m")?,
        speed_kph: cols.real(6, "speed_kph")?,
        heading_deg: cols.real(7, "heading_deg")?,
        battery_mv: cols.integer(8, "battery_mv")?,
        ignition: cols.flag(9, "ignition")?,
        raw_payload: cols.text(10, "raw_payload")?,
        processed: cols.flag(11, "processed")?,
        processed_at: cols
            .text(12, "processed_at")?
            .map(|s| parse_datetime(record_id, "processed_at", &s)),
        created_at: match cols.text(13, "created_at")? {
            Some(s) => parse_datetime(record_id, "created_at", &s),
            None => fallback_datetime(record_id, "created_at", "NULL"),
        },
    })
}

struct ColumnReader<'a, 'stmt> {
    row: &'a Row<'stmt>,
    record_id: i64,
}

impl ColumnReader<'_, '_> {
    fn text(&self, idx: usize, column: &str) -> rusqlite::Result<Option<String>> {
        Ok(match self.row.get_ref(idx)? {
            ValueRef::Null => None,
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => Some(s.to_string()),
                Err(_) => self.unreadable(column, "non-UTF-8 bytes"),
            },
            ValueRef::Integer(n) => Some(n.to_string()),
            ValueRef::Real(f) => Some(f.to_string()),
        })
    }

    fn real(&self, idx: usize, column: &str) -> rusqlite::Result<Option<f64>> {
        Ok(match self.row.get_ref(idx)? {
            ValueRef::Null => None,
            ValueRef::Real(f) => Some(f),
            ValueRef::Integer(n) => Some(n as f64),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|f| f.is_finite())
            {
                Some(f) => Some(f),
                None => self.unreadable(column, &String::from_utf8_lossy(bytes)),
            },
            ValueRef::Blob(_) => self.unreadable(column, "blob"),
        })
    }

    fn integer(&self, idx: usize, column: &str) -> rusqlite::Result<Option<i64>> {
        Ok(match self.row.get_ref(idx)? {
            ValueRef::Null => None,
            ValueRef::Integer(n) => Some(n),
            ValueRef::Real(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
            ValueRef::Real(f) => self.unreadable(column, &f.to_string()),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
            {
                Some(n) => Some(n),
                None => self.unreadable(column, &String::from_utf8_lossy(bytes)),
            },
            ValueRef::Blob(_) => self.unreadable(column, "blob"),
        })
    }

    fn flag(&self, idx: usize, column: &str) -> rusqlite::Result<Option<bool>> {
        Ok(match self.row.get_ref(idx)? {
            ValueRef::Null => None,
            ValueRef::Integer(n) => Some(n != 0),
            ValueRef::Real(f) => Some(f != 0.0),
            ValueRef::Text(bytes) => {
                let raw = String::from_utf8_lossy(bytes);
                match raw.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" => Some(true),
                    "0" | "false" => Some(false),
                    _ => self.unreadable(column, &raw),
                }
            }
            ValueRef::Blob(_) => self.unreadable(column, "blob"),
        })
    }

    fn unreadable<T>(&self, column: &str, found: &str) -> Option<T> {
        warn!(
            record_id = self.record_id,
            column,
            found,
            "Unreadable column value, reading as NULL"
        );
        None
    }
}

/// Parse an RFC 3339 datetime, falling back to the current time on error.
fn parse_datetime(record_id: i64, column: &str, s: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => fallback_datetime(record_id, column, s),
    }
}

fn fallback_datetime(record_id: i64, column: &str, found: &str) -> DateTime<Utc> {
    warn!(
        record_id,
        column,
        found,
        "Unparseable datetime, using current time"
    );
    Utc::now()
}
