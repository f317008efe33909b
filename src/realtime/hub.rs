use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

/// Outbound message queue length per connection. A client that lets this
/// many messages pile up is treated as stalled and evicted.
pub const CLIENT_BUFFER: usize = 64;

pub type ConnectionId = u64;

/// Owns the set of live client connections and fans each broadcast out to
/// all of them. The set is only ever mutated through `register`,
/// `unregister` and the lazy eviction inside `broadcast`.
pub struct ConnectionHub {
    connections: Mutex<HashMap<ConnectionId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl ConnectionHub {
    pub fn new() -> Self {
        ConnectionHub {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a connection's send capability to the set.
    pub async fn register(&self, sender: mpsc::Sender<String>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().await.insert(id, sender);
        debug!(connection_id = id, "connection registered");
        id
    }

    /// Remove a connection if present. Removing an unknown or already
    /// removed id is a no-op.
    pub async fn unregister(&self, id: ConnectionId) {
        if self.connections.lock().await.remove(&id).is_some() {
            debug!(connection_id = id, "connection unregistered");
        }
    }

    /// Deliver `message` to every connection in the set as of the snapshot
    /// taken at the start of the call. Each delivery is attempted
    /// independently; a connection whose queue is full or whose receiver is
    /// gone is evicted after that single failed attempt. Never blocks on a
    /// slow client and never returns an error.
    pub async fn broadcast(&self, message: &str) {
        let targets: Vec<(ConnectionId, mpsc::Sender<String>)> = {
            let connections = self.connections.lock().await;
            connections
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.try_send(message.to_string()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.lock().await;
            for id in &dead {
                connections.remove(id);
            }
            debug!(evicted = dead.len(), "evicted connections after failed delivery");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Drop every send capability, ending all connection tasks. Used on
    /// shutdown.
    pub async fn clear(&self) {
        let mut connections = self.connections.lock().await;
        let drained = connections.len();
        connections.clear();
        if drained > 0 {
            info!(connections = drained, "closed all live connections");
        }
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn expect_message(rx: &mut mpsc::Receiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("channel closed unexpectedly")
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let hub = ConnectionHub::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
            hub.register(tx).await;
            receivers.push(rx);
        }

        hub.broadcast("hello").await;

        for rx in &mut receivers {
            assert_eq!(expect_message(rx).await, "hello");
        }
    }

    #[tokio::test]
    async fn failing_connection_is_isolated_and_evicted() {
        let hub = ConnectionHub::new();
        let (tx1, mut rx1) = mpsc::channel(CLIENT_BUFFER);
        let (tx2, rx2) = mpsc::channel(CLIENT_BUFFER);
        let (tx3, mut rx3) = mpsc::channel(CLIENT_BUFFER);
        hub.register(tx1).await;
        hub.register(tx2).await;
        hub.register(tx3).await;
        drop(rx2);

        hub.broadcast("still delivered").await;

        assert_eq!(expect_message(&mut rx1).await, "still delivered");
        assert_eq!(expect_message(&mut rx3).await, "still delivered");
        assert_eq!(hub.connection_count().await, 2);
    }

    #[tokio::test]
    async fn stalled_connection_is_evicted_without_blocking() {
        let hub = ConnectionHub::new();
        let (stalled_tx, _stalled_rx) = mpsc::channel(1);
        let (live_tx, mut live_rx) = mpsc::channel(CLIENT_BUFFER);
        hub.register(stalled_tx).await;
        hub.register(live_tx).await;

        // First broadcast fills the stalled client's queue; the second
        // fails for it and evicts it.
        hub.broadcast("one").await;
        hub.broadcast("two").await;

        assert_eq!(expect_message(&mut live_rx).await, "one");
        assert_eq!(expect_message(&mut live_rx).await, "two");
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = ConnectionHub::new();
        let (tx, _rx) = mpsc::channel(CLIENT_BUFFER);
        let id = hub.register(tx).await;

        hub.unregister(id).await;
        hub.unregister(id).await;
        hub.unregister(9999).await;

        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn late_registrant_receives_subsequent_broadcasts() {
        let hub = ConnectionHub::new();
        let (tx1, mut rx1) = mpsc::channel(CLIENT_BUFFER);
        hub.register(tx1).await;

        hub.broadcast("first").await;

        let (tx2, mut rx2) = mpsc::channel(CLIENT_BUFFER);
        hub.register(tx2).await;

        hub.broadcast("second").await;

        assert_eq!(expect_message(&mut rx1).await, "first");
        assert_eq!(expect_message(&mut rx1).await, "second");
        assert_eq!(expect_message(&mut rx2).await, "second");
    }

    #[tokio::test]
    async fn membership_churn_during_broadcasts_never_hangs() {
        let hub = Arc::new(ConnectionHub::new());

        let broadcaster = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for i in 0..100 {
                    hub.broadcast(&format!("message {i}")).await;
                }
            })
        };

        let mut churners = Vec::new();
        for _ in 0..4 {
            let hub = Arc::clone(&hub);
            churners.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
                    let id = hub.register(tx).await;
                    tokio::task::yield_now().await;
                    drop(rx);
                    hub.unregister(id).await;
                }
            }));
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            broadcaster.await.unwrap();
            for churner in churners {
                churner.await.unwrap();
            }
        })
        .await
        .expect("broadcast or churn task hung");

        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn clear_closes_every_connection() {
        let hub = ConnectionHub::new();
        let (tx, mut rx) = mpsc::channel(CLIENT_BUFFER);
        hub.register(tx).await;

        hub.clear().await;

        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(rx.recv().await, None);
    }
}
