//! Classified events and their stored representation.
//!
//! Records keep the field names used by the existing database so that
//! previously written data stays readable:
//!
//! ```text
//! proximidad/<key> = { "estado": "Objeto detectado cerca", "fecha": "2024-01-01 10:00:00" }
//! movimiento/<key> = { "tipo": "sacudida",               "fecha": "2024-01-01 10:00:00" }
//! ```

use chrono::{DateTime, Local, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Format of the `fecha` field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which classifier produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Proximity,
    Motion,
}

impl EventKind {
    /// Name shown on report cards.
    pub fn display_name(&self) -> &'static str {
        match self {
            EventKind::Proximity => "Proximidad",
            EventKind::Motion => "Movimiento",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A classified occurrence, written once to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub label: String,
    /// Local wall-clock time, second precision
    pub occurred_at: NaiveDateTime,
}

impl Event {
    pub fn new(kind: EventKind, label: impl Into<String>, occurred_at: NaiveDateTime) -> Self {
        Self {
            kind,
            label: label.into(),
            occurred_at,
        }
    }

    /// Build an event stamped with the local time of a capture instant.
    pub fn captured(kind: EventKind, label: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(kind, label, local_timestamp(at))
    }

    /// The JSON record written to the store.
    pub fn to_record(&self) -> Value {
        let fecha = format_timestamp(&self.occurred_at);
        let record = match self.kind {
            EventKind::Proximity => serde_json::to_value(ProximityRecord {
                estado: self.label.clone(),
                fecha,
            }),
            EventKind::Motion => serde_json::to_value(MotionRecord {
                tipo: self.label.clone(),
                fecha,
            }),
        };
        // Both records are plain string structs.
        record.unwrap_or(Value::Null)
    }

    /// Decode a stored record. Returns `None` for anything that is not a
    /// record of this kind with a parseable `fecha`.
    pub fn from_record(kind: EventKind, value: &Value) -> Option<Self> {
        let (label, fecha) = match kind {
            EventKind::Proximity => {
                let record = ProximityRecord::deserialize(value).ok()?;
                (record.estado, record.fecha)
            }
            EventKind::Motion => {
                let record = MotionRecord::deserialize(value).ok()?;
                (record.tipo, record.fecha)
            }
        };
        let occurred_at = parse_timestamp(&fecha)?;
        Some(Self::new(kind, label, occurred_at))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProximityRecord {
    #[serde(default)]
    estado: String,
    #[serde(default)]
    fecha: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MotionRecord {
    #[serde(default)]
    tipo: String,
    #[serde(default)]
    fecha: String,
}

/// Convert a capture instant to local time truncated to whole seconds.
pub fn local_timestamp(at: DateTime<Utc>) -> NaiveDateTime {
    let local = at.with_timezone(&Local).naive_local();
    local.with_nanosecond(0).unwrap_or(local)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_proximity_record_shape() {
        let event = Event::new(
            EventKind::Proximity,
            "Objeto detectado cerca",
            ts("2024-01-01 10:00:00"),
        );
        assert_eq!(
            event.to_record(),
            json!({"estado": "Objeto detectado cerca", "fecha": "2024-01-01 10:00:00"})
        );
    }

    #[test]
    fn test_motion_record_decodes() {
        let value = json!({"tipo": "sacudida", "fecha": "2024-01-01 09:00:00"});
        let event = Event::from_record(EventKind::Motion, &value).unwrap();
        assert_eq!(event.label, "sacudida");
        assert_eq!(event.occurred_at, ts("2024-01-01 09:00:00"));
    }

    #[test]
    fn test_missing_label_defaults_to_empty() {
        let value = json!({"fecha": "2024-01-01 09:00:00"});
        let event = Event::from_record(EventKind::Proximity, &value).unwrap();
        assert_eq!(event.label, "");
    }

    #[test]
    fn test_unusable_records_are_rejected() {
        assert!(Event::from_record(EventKind::Motion, &json!({"tipo": "leve"})).is_none());
        assert!(Event::from_record(EventKind::Motion, &json!({"tipo": "leve", "fecha": "ayer"})).is_none());
        assert!(Event::from_record(EventKind::Motion, &json!("sacudida")).is_none());
    }

    #[test]
    fn test_local_timestamp_drops_subseconds() {
        let at = Utc::now();
        assert_eq!(local_timestamp(at).nanosecond(), 0);
    }
}
