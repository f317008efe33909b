use crate::db::models::PollSnapshot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The single event stream shared by the whole application.
pub const POLLS_CHANNEL: &str = "polls_channel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    PollCreated,
    PollUpdated,
    PollDeleted,
    VoteCast,
    VoteSwitched,
    VoteReverted,
    Liked,
    Unliked,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::PollCreated => "poll_created",
            EventAction::PollUpdated => "poll_updated",
            EventAction::PollDeleted => "poll_deleted",
            EventAction::VoteCast => "vote_cast",
            EventAction::VoteSwitched => "vote_switched",
            EventAction::VoteReverted => "vote_reverted",
            EventAction::Liked => "liked",
            EventAction::Unliked => "unliked",
        }
    }
}

/// One poll state change, published after the storage mutation committed.
///
/// Every action carries the full poll snapshot except `poll_deleted`,
/// which carries only the poll id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollEvent {
    pub action: EventAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

impl PollEvent {
    pub fn with_snapshot(action: EventAction, poll: PollSnapshot, user_id: Option<Uuid>) -> Self {
        PollEvent {
            action,
            poll: Some(poll),
            poll_id: None,
            user_id,
        }
    }

    pub fn deleted(poll_id: Uuid, user_id: Option<Uuid>) -> Self {
        PollEvent {
            action: EventAction::PollDeleted,
            poll: None,
            poll_id: Some(poll_id),
            user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::OptionSnapshot;
    use chrono::Utc;

    fn sample_snapshot() -> PollSnapshot {
        PollSnapshot {
            id: Uuid::new_v4(),
            owner_id: Some(Uuid::new_v4()),
            question: "Tabs or spaces?".to_string(),
            options: vec![OptionSnapshot {
                id: Uuid::new_v4(),
                text: "Tabs".to_string(),
                count: 3,
            }],
            likes: 1,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn action_names_are_snake_case() {
        let actions = [
            (EventAction::PollCreated, "\"poll_created\""),
            (EventAction::PollUpdated, "\"poll_updated\""),
            (EventAction::PollDeleted, "\"poll_deleted\""),
            (EventAction::VoteCast, "\"vote_cast\""),
            (EventAction::VoteSwitched, "\"vote_switched\""),
            (EventAction::VoteReverted, "\"vote_reverted\""),
            (EventAction::Liked, "\"liked\""),
            (EventAction::Unliked, "\"unliked\""),
        ];
        for (action, expected) in actions {
            assert_eq!(serde_json::to_string(&action).unwrap(), expected);
        }
    }

    #[test]
    fn snapshot_event_wire_shape() {
        let snapshot = sample_snapshot();
        let event =
            PollEvent::with_snapshot(EventAction::VoteCast, snapshot.clone(), snapshot.owner_id);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();

        assert_eq!(json["action"], "vote_cast");
        assert_eq!(json["poll"]["_id"], snapshot.id.to_string());
        assert_eq!(json["poll"]["options"][0]["count"], 3);
        assert!(json.get("poll_id").is_none());
    }

    #[test]
    fn deleted_event_carries_only_poll_id() {
        let poll_id = Uuid::new_v4();
        let event = PollEvent::deleted(poll_id, None);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();

        assert_eq!(json["action"], "poll_deleted");
        assert_eq!(json["poll_id"], poll_id.to_string());
        assert!(json.get("poll").is_none());
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn events_roundtrip() {
        let event = PollEvent::with_snapshot(EventAction::Liked, sample_snapshot(), None);
        let decoded: PollEvent =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(decoded.action, EventAction::Liked);
        assert_eq!(
            decoded.poll.unwrap().question,
            event.poll.unwrap().question
        );
    }
}
