//! Record transformer: source row to publish-ready event.
//!
//! Transformation is pure apart from the `captured_at` stamp, which callers
//! pass in. The `event_id` is `{device_id}:{epoch_millis}:{record_id}` and
//! never depends on `captured_at`, so re-delivering a record yields the same
//! key downstream.

use crate::error::{OutboxError, OutboxResult};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use outbox_database::TelemetryRecord;
use outbox_stream::EncodedEvent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Device id used when a record has none and the policy is `Sentinel`.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Canonical wire field names of a [`TransformedEvent`].
pub const EVENT_FIELDS: &[&str] = &[
    "event_id",
    "record_id",
    "device_id",
    "recorded_at",
    "latitude",
    "longitude",
    "altitude_m",
    "speed_kph",
    "heading_deg",
    "battery_mv",
    "ignition",
    "raw_payload",
    "captured_at",
];

/// Millisecond timestamps start here; smaller integers are read as seconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

/// Record-scoped failure. The record is skipped and stays pending.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("record {record_id}: missing required field `{field}`")]
    MissingField {
        record_id: i64,
        field: &'static str,
    },

    #[error("record {record_id}: unparseable recorded_at `{value}`")]
    InvalidTimestamp { record_id: i64, value: String },

    #[error("record {record_id}: encode failed: {reason}")]
    Encode { record_id: i64, reason: String },
}

/// What to do when `device_id` or `recorded_at` is missing or malformed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFieldPolicy {
    /// Substitute `"unknown"` and the Unix epoch.
    #[default]
    Sentinel,
    /// Fail the record with a [`TransformError`].
    Reject,
}

impl FromStr for MissingFieldPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentinel" => Ok(Self::Sentinel),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown missing field policy `{other}` (expected `sentinel` or `reject`)"
            )),
        }
    }
}

impl fmt::Display for MissingFieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sentinel => f.write_str("sentinel"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

/// Output key remapping applied when an event is encoded.
///
/// Keys are canonical names from [`EVENT_FIELDS`]; values are the names
/// written on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRenames(BTreeMap<String, String>);

impl FieldRenames {
    /// Build a remapping, rejecting unknown canonical names and output collisions.
    pub fn new(renames: BTreeMap<String, String>) -> OutboxResult<Self> {
        let unknown: Vec<&str> = renames
            .keys()
            .map(String::as_str)
            .filter(|name| !EVENT_FIELDS.contains(name))
            .collect();
        if !unknown.is_empty() {
            return Err(OutboxError::InvalidConfig(format!(
                "unknown event fields in field_renames: {}",
                unknown.join(", ")
            )));
        }

        let mut outputs = HashSet::new();
        for field in EVENT_FIELDS {
            let output = renames.get(*field).map(String::as_str).unwrap_or(*field);
            if output.is_empty() {
                return Err(OutboxError::InvalidConfig(format!(
                    "field_renames maps `{field}` to an empty name"
                )));
            }
            if !outputs.insert(output) {
                return Err(OutboxError::InvalidConfig(format!(
                    "field_renames produces duplicate output field `{output}`"
                )));
            }
        }

        Ok(Self(renames))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire name for a canonical field.
    pub fn output_name<'a>(&'a self, field: &'a str) -> &'a str {
        self.0.get(field).map(String::as_str).unwrap_or(field)
    }
}

/// A record ready to publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedEvent {
    pub event_id: String,
    pub record_id: i64,
    pub device_id: String,
    /// RFC 3339 UTC, millisecond precision, `Z` suffix.
    pub recorded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kph: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_mv: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    pub captured_at: String,
}

/// Maps [`TelemetryRecord`]s to events and encodes them for the wire.
#[derive(Debug, Clone, Default)]
pub struct RecordTransformer {
    policy: MissingFieldPolicy,
    renames: FieldRenames,
}

impl RecordTransformer {
    pub fn new(policy: MissingFieldPolicy, renames: FieldRenames) -> Self {
        Self { policy, renames }
    }

    /// Build the event for `record`, stamping it with `captured_at`.
    pub fn transform(
        &self,
        record: &TelemetryRecord,
        captured_at: DateTime<Utc>,
    ) -> Result<TransformedEvent, TransformError> {
        let record_id = record.record_id;

        let device_id = match record.device_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => match self.policy {
                MissingFieldPolicy::Sentinel => UNKNOWN_DEVICE.to_string(),
                MissingFieldPolicy::Reject => {
                    return Err(TransformError::MissingField {
                        record_id,
                        field: "device_id",
                    })
                }
            },
        };

        let recorded_at = match record.recorded_at.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => match parse_timestamp(raw) {
                Some(ts) => ts,
                None if self.policy == MissingFieldPolicy::Sentinel => DateTime::<Utc>::UNIX_EPOCH,
                None => {
                    return Err(TransformError::InvalidTimestamp {
                        record_id,
                        value: raw.to_string(),
                    })
                }
            },
            _ => match self.policy {
                MissingFieldPolicy::Sentinel => DateTime::<Utc>::UNIX_EPOCH,
                MissingFieldPolicy::Reject => {
                    return Err(TransformError::MissingField {
                        record_id,
                        field: "recorded_at",
                    })
                }
            },
        };

        Ok(TransformedEvent {
            event_id: event_id(&device_id, recorded_at, record_id),
            record_id,
            device_id,
            recorded_at: format_timestamp(recorded_at),
            latitude: record.latitude,
            longitude: record.longitude,
            altitude_m: record.altitude_m,
            speed_kph: record.speed_kph,
            heading_deg: record.heading_deg,
            battery_mv: record.battery_mv,
            ignition: record.ignition,
            raw_payload: record.raw_payload.clone(),
            captured_at: format_timestamp(captured_at),
        })
    }

    /// Serialize an event to its wire JSON, applying field renames.
    pub fn encode(&self, event: &TransformedEvent) -> Result<EncodedEvent, TransformError> {
        let encode_err = |e: serde_json::Error| TransformError::Encode {
            record_id: event.record_id,
            reason: e.to_string(),
        };

        let body = if self.renames.is_empty() {
            serde_json::to_vec(event).map_err(encode_err)?
        } else {
            let value = serde_json::to_value(event).map_err(encode_err)?;
            let renamed: serde_json::Map<String, serde_json::Value> = match value {
                serde_json::Value::Object(fields) => fields
                    .into_iter()
                    .map(|(k, v)| (self.renames.output_name(&k).to_string(), v))
                    .collect(),
                other => {
                    return Err(TransformError::Encode {
                        record_id: event.record_id,
                        reason: format!("expected a JSON object, got {other}"),
                    })
                }
            };
            serde_json::to_vec(&renamed).map_err(encode_err)?
        };

        Ok(EncodedEvent::new(event.record_id, event.event_id.clone(), body))
    }

    /// Transform and encode in one step.
    pub fn prepare(
        &self,
        record: &TelemetryRecord,
        captured_at: DateTime<Utc>,
    ) -> Result<EncodedEvent, TransformError> {
        let event = self.transform(record, captured_at)?;
        self.encode(&event)
    }
}

/// Idempotency key shared by every delivery of the same record.
pub fn event_id(device_id: &str, recorded_at: DateTime<Utc>, record_id: i64) -> String {
    format!("{}:{}:{}", device_id, recorded_at.timestamp_millis(), record_id)
}

/// RFC 3339 UTC with millisecond precision and a `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse the timestamp shapes the decoder writes.
///
/// Accepts RFC 3339 with any offset, naive `YYYY-MM-DD HH:MM:SS[.fff]` (or
/// with a `T` separator) read as UTC, and integer Unix seconds or
/// milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(n) = raw.parse::<i64>() {
        return if n.unsigned_abs() >= MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        };
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(record_id: i64, device: Option<&str>, recorded_at: Option<&str>) -> TelemetryRecord {
        TelemetryRecord {
            record_id,
            device_id: device.map(str::to_string),
            recorded_at: recorded_at.map(str::to_string),
            latitude: Some(48.8566),
            longitude: Some(2.3522),
            altitude_m: None,
            speed_kph: Some(12.0),
            heading_deg: None,
            battery_mv: Some(3900),
            ignition: Some(false),
            raw_payload: None,
            processed: Some(false),
            processed_at: None,
            created_at: Utc::now(),
        }
    }

    fn captured() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:30:00"), Some(expected));
        assert_eq!(parse_timestamp("1714566600"), Some(expected));
        assert_eq!(parse_timestamp("1714566600000"), Some(expected));
        assert_eq!(parse_timestamp(" 1714566600 "), Some(expected));

        let fractional = parse_timestamp("2024-05-01 12:30:00.250").unwrap();
        assert_eq!(fractional.timestamp_millis(), expected.timestamp_millis() + 250);

        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-01 00:00:00"), None);
    }

    #[test]
    fn test_transform_normalizes_timestamp() {
        let transformer = RecordTransformer::default();
        let event = transformer
            .transform(&record(9, Some("dev-1"), Some("2024-05-01 12:30:00.5")), captured())
            .unwrap();

        assert_eq!(event.recorded_at, "2024-05-01T12:30:00.500Z");
        assert_eq!(event.captured_at, "2024-06-01T00:00:00.000Z");
        assert_eq!(event.event_id, "dev-1:1714566600500:9");
        assert_eq!(event.battery_mv, Some(3900));
    }

    #[test]
    fn test_event_id_ignores_capture_time() {
        let transformer = RecordTransformer::default();
        let r = record(3, Some("dev-2"), Some("1714566600"));

        let first = transformer.transform(&r, captured()).unwrap();
        let later = transformer.transform(&r, Utc::now()).unwrap();

        assert_eq!(first.event_id, later.event_id);
        assert_ne!(first.captured_at, later.captured_at);
    }

    #[test]
    fn test_sentinel_policy_substitutes_defaults() {
        let transformer = RecordTransformer::new(MissingFieldPolicy::Sentinel, FieldRenames::default());

        let missing = transformer.transform(&record(4, None, None), captured()).unwrap();
        assert_eq!(missing.device_id, UNKNOWN_DEVICE);
        assert_eq!(missing.recorded_at, "1970-01-01T00:00:00.000Z");
        assert_eq!(missing.event_id, "unknown:0:4");

        let garbled = transformer
            .transform(&record(5, Some("  "), Some("not a time")), captured())
            .unwrap();
        assert_eq!(garbled.event_id, "unknown:0:5");
    }

    #[test]
    fn test_reject_policy_fails_record() {
        let transformer = RecordTransformer::new(MissingFieldPolicy::Reject, FieldRenames::default());

        let err = transformer
            .transform(&record(6, None, Some("1714566600")), captured())
            .unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingField {
                record_id: 6,
                field: "device_id"
            }
        );

        let err = transformer
            .transform(&record(7, Some("dev"), Some("garbage")), captured())
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidTimestamp { record_id: 7, .. }));

        let err = transformer
            .transform(&record(8, Some("dev"), None), captured())
            .unwrap_err();
        assert!(matches!(
            err,
            TransformError::MissingField {
                field: "recorded_at",
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_range_integer_timestamps() {
        let extremes = [i64::MIN.to_string(), i64::MAX.to_string()];
        for raw in &extremes {
            assert_eq!(parse_timestamp(raw), None, "{raw}");
        }

        let sentinel = RecordTransformer::new(MissingFieldPolicy::Sentinel, FieldRenames::default());
        let reject = RecordTransformer::new(MissingFieldPolicy::Reject, FieldRenames::default());
        for raw in &extremes {
            let event = sentinel
                .transform(&record(10, Some("dev-1"), Some(raw)), captured())
                .unwrap();
            assert_eq!(event.recorded_at, "1970-01-01T00:00:00.000Z");
            assert_eq!(event.event_id, "dev-1:0:10");

            let err = reject
                .transform(&record(11, Some("dev-1"), Some(raw)), captured())
                .unwrap_err();
            assert_eq!(
                err,
                TransformError::InvalidTimestamp {
                    record_id: 11,
                    value: raw.clone()
                }
            );
        }
    }

    #[test]
    fn test_encode_skips_absent_fields() {
        let transformer = RecordTransformer::default();
        let encoded = transformer
            .prepare(&record(1, Some("dev-1"), Some("1714566600")), captured())
            .unwrap();

        assert_eq!(encoded.record_id, 1);
        assert_eq!(encoded.event_id, "dev-1:1714566600000:1");
        let json: serde_json::Value = serde_json::from_slice(&encoded.body).unwrap();
        assert_eq!(json["device_id"], "dev-1");
        assert_eq!(json["speed_kph"], 12.0);
        assert!(json.get("altitude_m").is_none());
    }

    #[test]
    fn test_encode_applies_renames() {
        let renames = FieldRenames::new(BTreeMap::from([
            ("device_id".to_string(), "deviceId".to_string()),
            ("recorded_at".to_string(), "ts".to_string()),
        ]))
        .unwrap();
        let transformer = RecordTransformer::new(MissingFieldPolicy::Sentinel, renames);

        let encoded = transformer
            .prepare(&record(2, Some("dev-9"), Some("1714566600")), captured())
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&encoded.body).unwrap();

        assert_eq!(json["deviceId"], "dev-9");
        assert_eq!(json["ts"], "2024-05-01T12:30:00.000Z");
        assert!(json.get("device_id").is_none());
        assert_eq!(json["event_id"], "dev-9:1714566600000:2");
    }

    #[test]
    fn test_field_renames_validation() {
        let unknown = FieldRenames::new(BTreeMap::from([("colour".to_string(), "c".to_string())]));
        assert!(matches!(unknown, Err(OutboxError::InvalidConfig(_))));

        let collision = FieldRenames::new(BTreeMap::from([(
            "latitude".to_string(),
            "longitude".to_string(),
        )]));
        assert!(matches!(collision, Err(OutboxError::InvalidConfig(_))));

        let swap = FieldRenames::new(BTreeMap::from([
            ("latitude".to_string(), "longitude".to_string()),
            ("longitude".to_string(), "latitude".to_string()),
        ]));
        assert!(swap.is_ok());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Reject".parse::<MissingFieldPolicy>(), Ok(MissingFieldPolicy::Reject));
        assert_eq!(" sentinel ".parse::<MissingFieldPolicy>(), Ok(MissingFieldPolicy::Sentinel));
        assert!("drop".parse::<MissingFieldPolicy>().is_err());
        assert_eq!(MissingFieldPolicy::Reject.to_string(), "reject");
    }
}
