//! Registry of active live streams and their cancellation channels.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::metrics;

/// Active streams keyed by stream id.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    streams: Arc<Mutex<HashMap<String, watch::Sender<bool>>>>,
}

/// Registration of one stream. Removes itself from the registry when dropped.
pub struct StreamTicket {
    id: String,
    registry: StreamRegistry,
}

impl StreamTicket {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for StreamTicket {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
        debug!(stream_id = %self.id, "Stream deregistered");
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream, returning its ticket and cancellation receiver.
    pub fn register(&self) -> (StreamTicket, watch::Receiver<bool>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = watch::channel(false);

        let active = {
            let mut streams = self.lock();
            streams.insert(id.clone(), tx);
            streams.len()
        };
        metrics::set_active_streams(active);

        let ticket = StreamTicket {
            id,
            registry: self.clone(),
        };
        (ticket, rx)
    }

    /// Cancel one stream by id. Returns whether it was active.
    pub fn stop(&self, id: &str) -> bool {
        let sender = self.lock().remove(id);
        match sender {
            Some(tx) => {
                let _ = tx.send(true);
                self.publish_count();
                true
            }
            None => false,
        }
    }

    /// Cancel every active stream. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let senders: Vec<_> = self.lock().drain().map(|(_, tx)| tx).collect();
        for tx in &senders {
            let _ = tx.send(true);
        }
        self.publish_count();
        senders.len()
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: &str) {
        self.lock().remove(id);
        self.publish_count();
    }

    fn publish_count(&self) {
        metrics::set_active_streams(self.active_count());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Sender<bool>>> {
        // A panic while holding the lock cannot leave the map inconsistent
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_one_stream() {
        let registry = StreamRegistry::new();
        let (a, rx_a) = registry.register();
        let (_b, rx_b) = registry.register();

        assert_eq!(registry.active_count(), 2);
        assert!(registry.stop(a.id()));
        assert!(*rx_a.borrow());
        assert!(!*rx_b.borrow());
        assert!(!registry.stop(a.id()));
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_stop_all() {
        let registry = StreamRegistry::new();
        let (_a, rx_a) = registry.register();
        let (_b, rx_b) = registry.register();

        assert_eq!(registry.stop_all(), 2);
        assert!(*rx_a.borrow());
        assert!(*rx_b.borrow());
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_ticket_drop_deregisters() {
        let registry = StreamRegistry::new();
        let (ticket, _rx) = registry.register();
        assert_eq!(registry.active_count(), 1);

        drop(ticket);
        assert_eq!(registry.active_count(), 0);
    }
}
