//! # Snapshot Store
//!
//! Name to latest-formatted-value mapping. The encoder reads auxiliary payload
//! fields from it; the device side keeps it fresh.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::core::reading::Reading;

/// Read access to the latest string value of a named measurement.
pub trait SnapshotStore: Send + Sync {
    /// Returns the current value for `name`, or `None` if it was never set.
    fn get(&self, name: &str) -> Option<String>;
}

/// # Memory Store
///
/// In-process `SnapshotStore`, refreshed from every accepted reading.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(name.to_string(), value.into());
    }

    /// Copies every measurement of `reading` into the store, formatted with
    /// `Display`. Names the reading does not carry keep their previous value.
    pub fn absorb(&self, reading: &Reading) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        for (name, value) in &reading.measurements {
            values.insert(name.clone(), value.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, name: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(name).cloned()
    }
}
