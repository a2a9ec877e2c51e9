//! # Reading
//!
//! The device-side data model: a timestamped set of named measurements.
//! Measurements are kept in name order so a reading always serializes the
//! same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// # Reading
///
/// One timestamped snapshot of the device state, as produced by the device
/// client. Immutable once built; the bridge consumes it exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Time (UTC) at which the device took the measurements.
    pub timestamp: DateTime<Utc>,
    /// Named measurements, e.g. `temperatureCelsius` or `windGustkmh`.
    #[serde(default)]
    pub measurements: BTreeMap<String, Measurement>,
}

impl Reading {
    /// Creates an empty reading taken at `timestamp`.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            measurements: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) a measurement and returns the reading, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Measurement>) -> Self {
        self.measurements.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Measurement> {
        self.measurements.get(name)
    }
}

/// # Measurement
///
/// A single device value. Nest devices report numbers (temperatures, speeds),
/// flags (away mode, leaf) and free text (hvac state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measurement {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl Measurement {
    /// Numbers must be finite to have a JSON representation.
    pub fn is_finite(&self) -> bool {
        match self {
            Measurement::Number(n) => n.is_finite(),
            _ => true,
        }
    }
}

/// Renders the value the way the snapshot store keeps it.
impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Flag(b) => write!(f, "{}", b),
            Measurement::Number(n) => write!(f, "{}", n),
            Measurement::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Measurement {
    fn from(value: f64) -> Self {
        Measurement::Number(value)
    }
}

impl From<bool> for Measurement {
    fn from(value: bool) -> Self {
        Measurement::Flag(value)
    }
}

impl From<&str> for Measurement {
    fn from(value: &str) -> Self {
        Measurement::Text(value.to_string())
    }
}

impl From<String> for Measurement {
    fn from(value: String) -> Self {
        Measurement::Text(value)
    }
}
