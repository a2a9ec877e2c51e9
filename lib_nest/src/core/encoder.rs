//! # Reading Encoder
//!
//! Builds the wire payload pushed to browsers from a `Reading` and a fixed,
//! ordered list of auxiliary fields looked up in a `SnapshotStore`.
//!
//! Two formats are supported:
//!
//! - **`Structured`**: one JSON object, `{"reading": {...}, "aux": {...}}`.
//! - **`Separated`**: the legacy dashboard format,
//!   `<reading-json>SEPARATOR<value1>SEPARATOR<value2>...`. Values are not
//!   escaped, so a value containing the separator is rejected.
//!
//! The output depends only on the reading and the store contents at call time.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::core::reading::Reading;
use crate::core::store::SnapshotStore;

/// Separator literal used by the legacy dashboard pages.
pub const DEFAULT_SEPARATOR: &str = "SEPARATOR";

/// Auxiliary fields appended to every payload unless configured otherwise.
pub const DEFAULT_AUX_FIELDS: [&str; 2] = ["temperatureCelsius", "windGustkmh"];

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("measurement '{name}' is not a finite number")]
    NonFinite { name: String },

    #[error("failed to serialize reading: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("auxiliary field '{field}' contains the separator token")]
    SeparatorCollision { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Structured,
    Separated,
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured" | "json" => Ok(WireFormat::Structured),
            "separated" | "legacy" => Ok(WireFormat::Separated),
            other => Err(format!("unknown wire format '{}'", other)),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Structured => f.write_str("structured"),
            WireFormat::Separated => f.write_str("separated"),
        }
    }
}

/// # Encoded Payload
///
/// Wire-ready text for one reading. Cheap to share behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    body: String,
}

impl EncodedPayload {
    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.body.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Display for EncodedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    reading: &'a Reading,
    aux: AuxFields<'a>,
}

/// Auxiliary values as a JSON object, keys in configured order.
struct AuxFields<'a>(&'a [(&'a str, String)]);

impl Serialize for AuxFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// # Reading Encoder
///
/// Holds the per-deployment encoding settings: the format, the separator
/// token and the ordered auxiliary field names.
#[derive(Debug, Clone)]
pub struct ReadingEncoder {
    format: WireFormat,
    separator: String,
    aux_fields: Vec<String>,
}

impl Default for ReadingEncoder {
    fn default() -> Self {
        Self::new(
            WireFormat::default(),
            DEFAULT_SEPARATOR,
            DEFAULT_AUX_FIELDS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl ReadingEncoder {
    pub fn new(format: WireFormat, separator: impl Into<String>, aux_fields: Vec<String>) -> Self {
        Self {
            format,
            separator: separator.into(),
            aux_fields,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn aux_fields(&self) -> &[String] {
        &self.aux_fields
    }

    /// Encodes `reading`, appending the store's current value for every
    /// auxiliary field. A field missing from the store encodes as `""`.
    ///
    /// # Errors
    /// `NonFinite` for NaN/infinite numbers, `Serialize` if serde fails, and
    /// for the `Separated` format `SeparatorCollision` when a value would
    /// make the payload ambiguous.
    pub fn encode(&self, reading: &Reading, store: &dyn SnapshotStore) -> Result<EncodedPayload, EncodeError> {
        if let Some((name, _)) = reading.measurements.iter().find(|(_, m)| !m.is_finite()) {
            return Err(EncodeError::NonFinite { name: name.clone() });
        }

        let aux: Vec<(&str, String)> = self
            .aux_fields
            .iter()
            .map(|name| (name.as_str(), store.get(name).unwrap_or_default()))
            .collect();

        let body = match self.format {
            WireFormat::Structured => serde_json::to_string(&Envelope {
                reading,
                aux: AuxFields(&aux),
            })?,
            WireFormat::Separated => {
                let mut body = serde_json::to_string(reading)?;
                if body.contains(&self.separator) {
                    return Err(EncodeError::SeparatorCollision {
                        field: "reading".to_string(),
                    });
                }
                for (name, value) in aux {
                    if value.contains(&self.separator) {
                        return Err(EncodeError::SeparatorCollision { field: name.to_string() });
                    }
                    body.push_str(&self.separator);
                    body.push_str(&value);
                }
                body
            }
        };

        Ok(EncodedPayload { body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn sample() -> Reading {
        Reading::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap())
            .with("temperatureCelsius", 20.5)
            .with("hvacState", "heating")
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.set("temperatureCelsius", "20.5");
        store.set("windGustkmh", "31");
        store
    }

    #[test]
    fn test_encode_is_deterministic() {
        let encoder = ReadingEncoder::default();
        let store = store();

        let first = encoder.encode(&sample(), &store).unwrap();
        let second = encoder.encode(&sample(), &store).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());

        let legacy = ReadingEncoder::new(WireFormat::Separated, DEFAULT_SEPARATOR, vec!["windGustkmh".into()]);
        assert_eq!(
            legacy.encode(&sample(), &store).unwrap(),
            legacy.encode(&sample(), &store).unwrap()
        );
    }

    #[test]
    fn test_structured_payload_carries_reading_and_aux() {
        let payload = ReadingEncoder::default().encode(&sample(), &store()).unwrap();
        let value: serde_json::Value = serde_json::from_str(payload.as_str()).unwrap();

        assert_eq!(value["reading"]["timestamp"], "2024-01-15T10:00:00Z");
        assert_eq!(value["reading"]["measurements"]["temperatureCelsius"], 20.5);
        assert_eq!(value["aux"]["temperatureCelsius"], "20.5");
        assert_eq!(value["aux"]["windGustkmh"], "31");
    }

    #[test]
    fn test_structured_aux_keeps_configured_order() {
        let encoder = ReadingEncoder::new(
            WireFormat::Structured,
            DEFAULT_SEPARATOR,
            vec!["windGustkmh".into(), "humidity".into(), "temperatureCelsius".into()],
        );
        let payload = encoder.encode(&sample(), &store()).unwrap();

        let aux = &payload.as_str()[payload.as_str().find(r#""aux":"#).unwrap()..];
        assert_eq!(aux, r#""aux":{"windGustkmh":"31","humidity":"","temperatureCelsius":"20.5"}}"#);
    }

    #[test]
    fn test_separated_payload_layout() {
        let encoder = ReadingEncoder::new(
            WireFormat::Separated,
            "SEPARATOR",
            vec!["temperatureCelsius".into(), "windGustkmh".into(), "humidity".into()],
        );
        let payload = encoder.encode(&sample(), &store()).unwrap();

        let parts: Vec<&str> = payload.as_str().split("SEPARATOR").collect();
        assert_eq!(parts.len(), 4);
        let reading: Reading = serde_json::from_str(parts[0]).unwrap();
        assert_eq!(reading, sample());
        assert_eq!(&parts[1..], &["20.5", "31", ""]);
    }

    #[test]
    fn test_separator_inside_value_is_rejected() {
        let store = store();
        store.set("windGustkmh", "12SEPARATOR3");
        let encoder = ReadingEncoder::new(WireFormat::Separated, "SEPARATOR", vec!["windGustkmh".into()]);

        match encoder.encode(&sample(), &store) {
            Err(EncodeError::SeparatorCollision { field }) => assert_eq!(field, "windGustkmh"),
            other => panic!("expected a separator collision, got {:?}", other),
        }
        // The structured format has no such ambiguity.
        assert!(ReadingEncoder::default().encode(&sample(), &store).is_ok());
    }

    #[test]
    fn test_non_finite_measurement_fails() {
        let reading = sample().with("windGustkmh", f64::NAN);
        let err = ReadingEncoder::default().encode(&reading, &store()).unwrap_err();
        assert!(matches!(err, EncodeError::NonFinite { ref name } if name == "windGustkmh"));
    }

    #[test]
    fn test_wire_format_parsing() {
        assert_eq!("Structured".parse::<WireFormat>(), Ok(WireFormat::Structured));
        assert_eq!("legacy".parse::<WireFormat>(), Ok(WireFormat::Separated));
        assert!("xml".parse::<WireFormat>().is_err());
    }
}
