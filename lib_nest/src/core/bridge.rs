//! # Broadcast Bridge
//!
//! Serializes the hand-off between the device reading stream and the browser
//! push connection. The bridge owns two pieces of shared state:
//!
//! 1.  **Latest payload**: the most recently encoded reading. Every ingest
//!     replaces it (last-value-wins); intermediate values are never queued.
//! 2.  **Active connection**: at most one attached push connection. Attaching
//!     a new one evicts the previous one.
//!
//! Both live behind a single mutex so that "replace the payload and push it"
//! on the ingest task can never interleave with "read the payload for the
//! catch-up push" on an upgrade task.
//!
//! Each connection receives payloads through a `tokio::sync::watch` channel,
//! a single-slot mailbox: a slow session only ever sees the newest payload.
//! Dropping the sender (eviction) ends the session's `Subscription`; dropping
//! the `Subscription` (session gone) makes the next push fail, which clears
//! the slot.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;

use crate::core::encoder::{EncodeError, EncodedPayload, ReadingEncoder};
use crate::core::reading::Reading;
use crate::core::store::SnapshotStore;

type Mailbox = Option<Arc<EncodedPayload>>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodeError),
}

/// Identity of one attached push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which upgrade endpoint a connection was opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Live dashboard page.
    Live,
    /// History page. Receives the same payloads as the live feed.
    History,
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feed::Live => f.write_str("live"),
            Feed::History => f.write_str("history"),
        }
    }
}

/// Outcome of a successful ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The payload was handed to the active connection.
    Pushed(ConnectionId),
    /// No connection was attached; the payload is only kept as latest.
    Stored,
    /// The active connection had gone away and was cleared.
    Lost(ConnectionId),
}

struct ActiveConnection {
    id: ConnectionId,
    feed: Feed,
    sender: watch::Sender<Mailbox>,
}

#[derive(Default)]
struct Slot {
    latest: Option<Arc<EncodedPayload>>,
    active: Option<ActiveConnection>,
}

/// # Bridge
///
/// Shared between the listener task and every upgrade/session task, usually
/// as `Arc<Bridge>`.
pub struct Bridge {
    encoder: ReadingEncoder,
    store: Arc<dyn SnapshotStore>,
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

impl Bridge {
    pub fn new(encoder: ReadingEncoder, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            encoder,
            store,
            slot: Mutex::new(Slot::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Ingest
    ///
    /// Encodes `reading`, makes it the latest payload and pushes it to the
    /// active connection if there is one.
    ///
    /// Encoding happens before the lock is taken; on failure the previous
    /// payload stays in effect and nothing is pushed. A failed push means the
    /// session dropped its subscription, so the slot is cleared.
    pub fn ingest(&self, reading: &Reading) -> Result<Delivery, BridgeError> {
        let payload = Arc::new(self.encoder.encode(reading, self.store.as_ref())?);
        let size = payload.len();

        let mut slot = self.lock();
        slot.latest = Some(Arc::clone(&payload));

        let Some(active) = slot.active.as_ref() else {
            return Ok(Delivery::Stored);
        };
        let id = active.id;
        if active.sender.send(Some(payload)).is_ok() {
            log::trace!("Pushed {} bytes to {}", size, id);
            Ok(Delivery::Pushed(id))
        } else {
            slot.active = None;
            log::warn!("Push to {} failed, connection is gone. Clearing active slot.", id);
            Ok(Delivery::Lost(id))
        }
    }

    /// # Attach
    ///
    /// Installs a new push connection, replacing (and thereby closing) the
    /// previous one. If a payload already exists it is placed in the new
    /// subscription at once, so the client is caught up without waiting for
    /// the next reading.
    pub fn attach(&self, feed: Feed) -> Subscription {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = watch::channel::<Mailbox>(None);

        let mut slot = self.lock();
        if let Some(latest) = slot.latest.as_ref() {
            sender.send_replace(Some(Arc::clone(latest)));
        }
        if let Some(previous) = slot.active.replace(ActiveConnection { id, feed, sender }) {
            log::info!("{} ({}) evicted by {} ({})", previous.id, previous.feed, id, feed);
        } else {
            log::info!("{} attached on {} feed", id, feed);
        }

        Subscription { id, feed, receiver }
    }

    /// Clears the active slot if `id` still owns it. Returns whether it did;
    /// an evicted connection detaching late must not remove its successor.
    pub fn detach(&self, id: ConnectionId) -> bool {
        let mut slot = self.lock();
        if slot.active.as_ref().is_some_and(|active| active.id == id) {
            slot.active = None;
            log::info!("{} detached", id);
            true
        } else {
            false
        }
    }

    pub fn latest(&self) -> Option<Arc<EncodedPayload>> {
        self.lock().latest.clone()
    }

    pub fn active_connection(&self) -> Option<(ConnectionId, Feed)> {
        self.lock().active.as_ref().map(|active| (active.id, active.feed))
    }
}

/// # Subscription
///
/// The receiving side of one push connection.
pub struct Subscription {
    id: ConnectionId,
    feed: Feed,
    receiver: watch::Receiver<Mailbox>,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }

    /// Waits for the next payload. Returns `None` once the connection has
    /// been evicted from the bridge and every pending payload was taken.
    pub async fn next(&mut self) -> Option<Arc<EncodedPayload>> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(payload) = self.receiver.borrow_and_update().clone() {
                return Some(payload);
            }
        }
    }

    /// Takes the pending payload without waiting, if there is one.
    pub fn try_next(&mut self) -> Option<Arc<EncodedPayload>> {
        match self.receiver.has_changed() {
            Ok(true) => self.receiver.borrow_and_update().clone(),
            _ => None,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("feed", &self.feed)
            .finish()
    }
}
