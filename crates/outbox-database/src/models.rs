//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded telemetry record waiting in (or already drained from) the outbox.
///
/// Payload columns are all optional: the store accepts whatever the upstream
/// decoder produced and the transformer decides what is usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub record_id: i64,
    pub device_id: Option<String>,
    /// Event time as written by the decoder: RFC 3339, naive UTC
    /// (`YYYY-MM-DD HH:MM:SS`), or Unix seconds/milliseconds as text.
    pub recorded_at: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_kph: Option<f64>,
    pub heading_deg: Option<f64>,
    pub battery_mv: Option<i64>,
    pub ignition: Option<bool>,
    pub raw_payload: Option<String>,
    /// `None` and `Some(false)` both mean "not yet delivered".
    pub processed: Option<bool>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TelemetryRecord {
    /// Whether the record has been marked delivered.
    pub fn is_processed(&self) -> bool {
        self.processed.unwrap_or(false)
    }
}

/// A record to append to the outbox (live feed / ingest path).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTelemetryRecord {
    pub device_id: Option<String>,
    pub recorded_at: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_kph: Option<f64>,
    pub heading_deg: Option<f64>,
    pub battery_mv: Option<i64>,
    pub ignition: Option<bool>,
    pub raw_payload: Option<String>,
}

/// Outbox counters for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub processed: u64,
    pub last_record_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_from_sparse_json() {
        let record: NewTelemetryRecord =
            serde_json::from_str(r#"{"device_id":"dev-7","recorded_at":"1700000000"}"#).unwrap();
        assert_eq!(record.device_id.as_deref(), Some("dev-7"));
        assert_eq!(record.recorded_at.as_deref(), Some("1700000000"));
        assert!(record.latitude.is_none());
        assert!(record.ignition.is_none());
    }

    #[test]
    fn test_tri_state_processed_flag() {
        let mut record = TelemetryRecord {
            record_id: 1,
            device_id: None,
            recorded_at: None,
            latitude: None,
            longitude: None,
            altitude_m: None,
            speed_kph: None,
            heading_deg: None,
            battery_mv: None,
            ignition: None,
            raw_payload: None,
            processed: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        assert!(!record.is_processed());
        record.processed = Some(false);
        assert!(!record.is_processed());
        record.processed = Some(true);
        assert!(record.is_processed());
    }
}
