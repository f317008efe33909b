use crate::error::BusError;
use crate::realtime::bus::EventBus;
use crate::realtime::hub::ConnectionHub;
use crate::realtime::models::{POLLS_CHANNEL, PollEvent};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bridges the event bus to the connection hub: one subscription for the
/// process lifetime, one broadcast per received event, no business logic.
pub struct UpdateDispatcher {
    task: JoinHandle<()>,
}

impl UpdateDispatcher {
    /// Subscribe to the polls channel and start the bridge task. Events are
    /// broadcast in the order the subscription yields them; a payload that
    /// does not decode as a poll event is logged and dropped without ending
    /// the loop.
    pub async fn start(bus: Arc<dyn EventBus>, hub: Arc<ConnectionHub>) -> Result<Self, BusError> {
        let mut subscription = bus.subscribe(POLLS_CHANNEL).await?;

        let task = tokio::spawn(async move {
            while let Some(payload) = subscription.recv().await {
                if let Err(e) = serde_json::from_str::<PollEvent>(&payload) {
                    warn!(error = %e, "dropping malformed event payload");
                    continue;
                }
                hub.broadcast(&payload).await;
            }
            debug!("update dispatcher stopped");
        });

        Ok(UpdateDispatcher { task })
    }

    /// Stop dispatching. Messages already broadcast are unaffected.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{OptionSnapshot, PollSnapshot};
    use crate::realtime::bus::InMemoryBus;
    use crate::realtime::hub::CLIENT_BUFFER;
    use crate::realtime::models::EventAction;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn yes_no_snapshot(poll_id: Uuid, yes: i64, no: i64) -> PollSnapshot {
        PollSnapshot {
            id: poll_id,
            owner_id: None,
            question: "Ship it?".to_string(),
            options: vec![
                OptionSnapshot {
                    id: Uuid::new_v4(),
                    text: "Yes".to_string(),
                    count: yes,
                },
                OptionSnapshot {
                    id: Uuid::new_v4(),
                    text: "No".to_string(),
                    count: no,
                },
            ],
            likes: 0,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    async fn expect_message(rx: &mut mpsc::Receiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("channel closed unexpectedly")
    }

    async fn register_client(hub: &ConnectionHub) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        hub.register(tx).await;
        rx
    }

    async fn wait_for_count(hub: &ConnectionHub, expected: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while hub.connection_count().await != expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("connection count never settled");
    }

    #[tokio::test]
    async fn every_client_receives_identical_payloads() {
        let bus = Arc::new(InMemoryBus::new());
        let hub = Arc::new(ConnectionHub::new());
        let dispatcher =
            UpdateDispatcher::start(Arc::clone(&bus) as Arc<dyn EventBus>, Arc::clone(&hub))
                .await
                .unwrap();

        let mut clients = Vec::new();
        for _ in 0..3 {
            clients.push(register_client(&hub).await);
        }

        let poll_id = Uuid::new_v4();
        let event = PollEvent::with_snapshot(
            EventAction::VoteCast,
            yes_no_snapshot(poll_id, 1, 0),
            Some(Uuid::new_v4()),
        );
        bus.publish(POLLS_CHANNEL, &event).await.unwrap();

        let expected = serde_json::to_string(&event).unwrap();
        for rx in &mut clients {
            assert_eq!(expect_message(rx).await, expected);
        }

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn failed_client_is_evicted_and_the_rest_keep_receiving() {
        let bus = Arc::new(InMemoryBus::new());
        let hub = Arc::new(ConnectionHub::new());
        let dispatcher =
            UpdateDispatcher::start(Arc::clone(&bus) as Arc<dyn EventBus>, Arc::clone(&hub))
                .await
                .unwrap();

        let mut client1 = register_client(&hub).await;
        let client2 = register_client(&hub).await;
        let mut client3 = register_client(&hub).await;
        drop(client2);

        let poll_id = Uuid::new_v4();
        let first = PollEvent::with_snapshot(EventAction::VoteCast, yes_no_snapshot(poll_id, 1, 0), None);
        bus.publish(POLLS_CHANNEL, &first).await.unwrap();

        let encoded_first = serde_json::to_string(&first).unwrap();
        assert_eq!(expect_message(&mut client1).await, encoded_first);
        assert_eq!(expect_message(&mut client3).await, encoded_first);
        wait_for_count(&hub, 2).await;

        let second = PollEvent::with_snapshot(EventAction::Liked, yes_no_snapshot(poll_id, 1, 0), None);
        bus.publish(POLLS_CHANNEL, &second).await.unwrap();

        let encoded_second = serde_json::to_string(&second).unwrap();
        assert_eq!(expect_message(&mut client1).await, encoded_second);
        assert_eq!(expect_message(&mut client3).await, encoded_second);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn vote_switch_sequence_arrives_in_order() {
        let bus = Arc::new(InMemoryBus::new());
        let hub = Arc::new(ConnectionHub::new());
        let dispatcher =
            UpdateDispatcher::start(Arc::clone(&bus) as Arc<dyn EventBus>, Arc::clone(&hub))
                .await
                .unwrap();

        let mut client = register_client(&hub).await;
        let poll_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let cast = PollEvent::with_snapshot(
            EventAction::VoteCast,
            yes_no_snapshot(poll_id, 1, 0),
            Some(user_id),
        );
        let switched = PollEvent::with_snapshot(
            EventAction::VoteSwitched,
            yes_no_snapshot(poll_id, 0, 1),
            Some(user_id),
        );
        bus.publish(POLLS_CHANNEL, &cast).await.unwrap();
        bus.publish(POLLS_CHANNEL, &switched).await.unwrap();

        let first: PollEvent = serde_json::from_str(&expect_message(&mut client).await).unwrap();
        let second: PollEvent = serde_json::from_str(&expect_message(&mut client).await).unwrap();

        assert_eq!(first.action, EventAction::VoteCast);
        let first_options = first.poll.unwrap().options;
        assert_eq!((first_options[0].count, first_options[1].count), (1, 0));

        assert_eq!(second.action, EventAction::VoteSwitched);
        let second_options = second.poll.unwrap().options;
        assert_eq!((second_options[0].count, second_options[1].count), (0, 1));

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_payload_does_not_stop_dispatch() {
        let bus = Arc::new(InMemoryBus::new());
        let hub = Arc::new(ConnectionHub::new());
        let dispatcher =
            UpdateDispatcher::start(Arc::clone(&bus) as Arc<dyn EventBus>, Arc::clone(&hub))
                .await
                .unwrap();

        let mut client = register_client(&hub).await;

        bus.publish_raw(POLLS_CHANNEL, "{not json").await;
        let event =
            PollEvent::with_snapshot(EventAction::PollCreated, yes_no_snapshot(Uuid::new_v4(), 0, 0), None);
        bus.publish(POLLS_CHANNEL, &event).await.unwrap();

        assert_eq!(
            expect_message(&mut client).await,
            serde_json::to_string(&event).unwrap()
        );

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_further_dispatch() {
        let bus = Arc::new(InMemoryBus::new());
        let hub = Arc::new(ConnectionHub::new());
        let dispatcher =
            UpdateDispatcher::start(Arc::clone(&bus) as Arc<dyn EventBus>, Arc::clone(&hub))
                .await
                .unwrap();
        let mut client = register_client(&hub).await;

        dispatcher.shutdown().await;

        let event =
            PollEvent::with_snapshot(EventAction::PollCreated, yes_no_snapshot(Uuid::new_v4(), 0, 0), None);
        bus.publish(POLLS_CHANNEL, &event).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_millis(200), client.recv()).await;
        assert!(outcome.is_err() || outcome == Ok(None));
    }
}
