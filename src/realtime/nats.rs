use crate::error::BusError;
use crate::realtime::bus::{EventBus, Subscription};
use crate::realtime::models::PollEvent;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Event bus backed by a NATS core subject, so several hub processes can
/// share one event stream. The contract is identical to `InMemoryBus`;
/// publishes while the broker connection is down are dropped, which the
/// delivery model already tolerates.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => {
                        warn!("event bus transport lost, running degraded until reconnect")
                    }
                    async_nats::Event::Connected => info!("event bus transport reconnected"),
                    other => debug!(?other, "event bus transport event"),
                }
            })
            .connect(url)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        info!(url, "connected to NATS event bus");
        Ok(NatsBus { client })
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, channel: &str, event: &PollEvent) -> Result<(), BusError> {
        let encoded = serde_json::to_string(event)?;
        self.client
            .publish(channel.to_string(), encoded.into())
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let mut subscriber = self
            .client
            .subscribe(channel.to_string())
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let relay = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                match String::from_utf8(message.payload.to_vec()) {
                    Ok(payload) => {
                        if tx.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "discarding non-utf8 bus message"),
                }
            }
            debug!("nats relay stopped");
        });

        Ok(Subscription::new(rx, move || relay.abort()))
    }
}
