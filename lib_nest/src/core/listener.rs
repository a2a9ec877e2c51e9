//! # Listener
//!
//! The long-lived ingest task. It waits, without timeout, for the next
//! reading on the inbound channel, refreshes the snapshot store from it and
//! hands it to the bridge. It stops when the shutdown signal fires or when
//! every producer has dropped its sender.
//!
//! The store is refreshed here, one reading at a time, so the auxiliary
//! fields of a payload always reflect the store as of that reading and never
//! a reading still waiting in the channel.
//!
//! Encoding failures only abandon the current reading; the loop keeps going.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::core::bridge::{Bridge, Delivery};
use crate::core::reading::Reading;
use crate::core::store::MemoryStore;

/// Counters reported when the listener stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    /// Readings that became the latest payload.
    pub ingested: u64,
    /// Readings dropped because they could not be encoded.
    pub failed: u64,
    /// Pushes that found the active connection gone.
    pub lost: u64,
}

pub async fn run(
    bridge: Arc<Bridge>,
    store: Arc<MemoryStore>,
    mut readings: mpsc::Receiver<Reading>,
    mut shutdown: broadcast::Receiver<()>,
) -> ListenerStats {
    let mut stats = ListenerStats::default();
    log::info!("Listener started, waiting for readings.");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                log::info!("Listener received shutdown signal.");
                break;
            }
            next = readings.recv() => {
                let Some(reading) = next else {
                    log::info!("Reading channel closed, listener stopping.");
                    break;
                };
                ingest_reading(&bridge, &store, &reading, &mut stats);
            }
        }
    }

    log::info!(
        "Listener stopped: {} ingested, {} failed, {} lost pushes.",
        stats.ingested,
        stats.failed,
        stats.lost
    );
    stats
}

fn ingest_reading(bridge: &Bridge, store: &MemoryStore, reading: &Reading, stats: &mut ListenerStats) {
    store.absorb(reading);
    match bridge.ingest(reading) {
        Ok(delivery) => {
            stats.ingested += 1;
            if let Delivery::Lost(_) = delivery {
                stats.lost += 1;
            }
            log::debug!(param = reading.timestamp.to_rfc3339(); "Ingested reading: {:?}", delivery);
        }
        Err(e) => {
            stats.failed += 1;
            log::error!(param = reading.timestamp.to_rfc3339(); "Dropping reading: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bridge::Feed;
    use crate::core::encoder::ReadingEncoder;
    use chrono::{TimeZone, Utc};

    fn reading(secs: u32, temp: f64) -> Reading {
        Reading::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, secs).unwrap()).with("temperatureCelsius", temp)
    }

    fn bridge_and_store() -> (Arc<Bridge>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Arc::new(Bridge::new(ReadingEncoder::default(), store.clone())), store)
    }

    fn aux_temperature(bridge: &Bridge) -> String {
        let payload = bridge.latest().unwrap();
        let value: serde_json::Value = serde_json::from_str(payload.as_str()).unwrap();
        value["aux"]["temperatureCelsius"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_listener_drains_channel_in_order() {
        let (bridge, store) = bridge_and_store();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(reading(1, 20.0)).await.unwrap();
        tx.send(reading(2, f64::NAN)).await.unwrap();
        tx.send(reading(3, 22.0)).await.unwrap();
        drop(tx);

        let stats = run(bridge.clone(), store, rx, shutdown_rx).await;
        assert_eq!(stats, ListenerStats { ingested: 2, failed: 1, lost: 0 });

        let latest = bridge.latest().unwrap();
        assert!(latest.as_str().contains("2024-01-15T10:00:03Z"));
    }

    #[tokio::test]
    async fn test_listener_pushes_to_attached_connection() {
        let (bridge, store) = bridge_and_store();
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut sub = bridge.attach(Feed::Live);

        let handle = tokio::spawn(run(bridge.clone(), store, rx, shutdown_rx));
        tx.send(reading(1, 20.5)).await.unwrap();

        let payload = sub.next().await.unwrap();
        assert!(payload.as_str().contains("20.5"));

        shutdown_tx.send(()).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.ingested, 1);
    }

    #[tokio::test]
    async fn test_aux_fields_match_the_reading_being_encoded() {
        let (bridge, store) = bridge_and_store();
        let (tx, mut rx) = mpsc::channel(8);

        // Both readings are queued before the listener takes the first one.
        tx.send(reading(1, 20.0)).await.unwrap();
        tx.send(reading(2, 25.0)).await.unwrap();
        assert!(store.is_empty());

        let mut stats = ListenerStats::default();
        let first = rx.recv().await.unwrap();
        ingest_reading(&bridge, &store, &first, &mut stats);
        assert_eq!(aux_temperature(&bridge), "20");

        let second = rx.recv().await.unwrap();
        ingest_reading(&bridge, &store, &second, &mut stats);
        assert_eq!(aux_temperature(&bridge), "25");
        assert_eq!(stats.ingested, 2);
    }
}
