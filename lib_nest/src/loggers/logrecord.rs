//! # Log Record Data Structure
//!
//! One line of the dashboard's operational log. The server's logger writes
//! each event as a single JSON object with the keys `time`, `msg`, `level`,
//! `param` and `fct`; the log page reads the same file back through
//! `logreader`.

use serde::{de, Deserialize, Serialize};
use serde_json::Value;

/// # LogRecord
///
/// A single log event. Every field is plain text so that lines written by
/// other tools in the same shape parse as well. Keys missing from a line
/// default to the empty string and unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRecord {
    /// Local time of the event, RFC 3339.
    pub time: String,
    /// The formatted log message.
    pub msg: String,
    /// Lowercase severity (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Optional parameter attached to the event (a URL, a timestamp, a
    /// payload excerpt); empty when the event carried none.
    pub param: String,
    /// Originating site, usually the module path of the caller.
    pub fct: String,
}

impl LogRecord {
    pub fn new(
        time: impl Into<String>,
        level: impl Into<String>,
        fct: impl Into<String>,
        msg: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        Self {
            time: time.into(),
            msg: msg.into(),
            level: level.into(),
            param: param.into(),
            fct: fct.into(),
        }
    }

    /// Serializes the record as one JSON line, without the trailing newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses one JSON line. Anything that is not a JSON object is an error.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        // Derived struct deserialization also accepts arrays; a log line must be an object.
        let value: Value = serde_json::from_str(line)?;
        if !value.is_object() {
            return Err(de::Error::custom("log line is not a JSON object"));
        }
        serde_json::from_value(value)
    }
}
