//! # lib_nest
//!
//! Streaming core of the nest dashboard. Each folder is gated behind a cargo
//! feature of the same name so the server only pulls what it uses.
//!
//! - **`core`**: readings, the snapshot store, the payload encoder, the
//!   single-slot broadcast bridge and the listener that feeds it.
//! - **`loggers`**: the JSON-lines log record and the reader that turns the
//!   server's log file back into records.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

#[cfg(feature = "core")]
pub mod core;
#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(feature = "core")]
pub use crate::core::{
    Bridge, BridgeError, ConnectionId, Delivery, EncodeError, EncodedPayload, Feed, Measurement,
    MemoryStore, Reading, ReadingEncoder, SnapshotStore, Subscription, WireFormat,
};
#[cfg(feature = "loggers")]
pub use loggers::logreader::{read_all, read_tail, LogPage, LogReadError};
#[cfg(feature = "loggers")]
pub use loggers::logrecord::LogRecord;
