//! # Core Streaming Module
//!
//! The producer/consumer heart of the dashboard. Device readings come in on a
//! channel, get encoded into a wire payload and are handed to whichever
//! browser connection is currently attached.
//!
//! ## Core Components:
//!
//! - **`reading`**: the `Reading` snapshot a device produces.
//! - **`store`**: the `SnapshotStore` seam and its in-memory implementation.
//! - **`encoder`**: turns a reading plus auxiliary store fields into an
//!   `EncodedPayload`.
//! - **`bridge`**: holds the latest payload and the single active connection
//!   behind one lock.
//! - **`listener`**: the long-lived task draining the reading channel into
//!   the bridge.

/// Device reading model.
pub mod reading;
/// Snapshot store used for the auxiliary payload fields.
pub mod store;
/// Reading to wire payload encoder.
pub mod encoder;
/// Single-slot broadcast bridge and connection subscriptions.
pub mod bridge;
/// Ingest loop feeding the bridge.
pub mod listener;

// --- Public API Re-exports ---
pub use bridge::{Bridge, BridgeError, ConnectionId, Delivery, Feed, Subscription};
pub use encoder::{EncodeError, EncodedPayload, ReadingEncoder, WireFormat};
pub use listener::ListenerStats;
pub use reading::{Measurement, Reading};
pub use store::{MemoryStore, SnapshotStore};
