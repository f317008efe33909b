use crate::error::BusError;
use crate::realtime::models::PollEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Publish/subscribe seam between the mutation handlers and the connection
/// hub. Implementations must deliver events for one channel to each
/// subscriber in publish order, and a dead subscriber must never surface as
/// a publish error.
///
/// `InMemoryBus` backs a single process; `NatsBus` puts a broker between
/// publishers and hubs so several hub processes can share the stream.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Encode `event` once and deliver it to every live subscription on
    /// `channel`.
    async fn publish(&self, channel: &str, event: &PollEvent) -> Result<(), BusError>;

    /// Register a new subscription on `channel`. Events published after this
    /// call returns are guaranteed to reach the subscription.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError>;
}

/// A live subscription yielding already-encoded event payloads.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<String>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<String>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Subscription {
            rx,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Next payload in publish order, or `None` once unsubscribed and
    /// drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Stop receiving events. Idempotent; also runs on drop.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

/// In-process fan-out list of subscribers, keyed by channel name.
pub struct InMemoryBus {
    channels: Arc<Mutex<HashMap<String, Vec<Subscriber>>>>,
    next_id: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        InMemoryBus {
            channels: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    async fn deliver(&self, channel: &str, encoded: String) {
        let mut channels = self.channels.lock().await;
        if let Some(subscribers) = channels.get_mut(channel) {
            let before = subscribers.len();
            subscribers.retain(|s| s.tx.send(encoded.clone()).is_ok());
            let dropped = before - subscribers.len();
            if dropped > 0 {
                debug!(channel, dropped, "removed dead subscriptions during publish");
            }
        }
    }

    /// Deliver a pre-encoded payload, bypassing event serialization.
    #[cfg(test)]
    pub(crate) async fn publish_raw(&self, channel: &str, payload: &str) {
        self.deliver(channel, payload.to_string()).await;
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, channel: &str, event: &PollEvent) -> Result<(), BusError> {
        let encoded = serde_json::to_string(event)?;
        self.deliver(channel, encoded).await;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut channels = self.channels.lock().await;
        channels
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        drop(channels);

        let channels = Arc::clone(&self.channels);
        let channel = channel.to_string();
        Ok(Subscription::new(rx, move || {
            // Runs from sync contexts (drop), so the slot removal is spawned.
            // A closed receiver is also weeded out lazily on the next publish.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Some(subscribers) = channels.lock().await.get_mut(&channel) {
                        subscribers.retain(|s| s.id != id);
                    }
                });
            }
        }))
    }
}
