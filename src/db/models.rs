use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub question: String,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The poll document as clients see it, both in HTTP responses and in
/// broadcast events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSnapshot {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub question: String,
    pub options: Vec<OptionSnapshot>,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSnapshot {
    pub id: Uuid,
    pub text: String,
    pub count: i64,
}

impl PollSnapshot {
    pub fn assemble(poll: Poll, options: Vec<OptionSnapshot>) -> Self {
        PollSnapshot {
            id: poll.id,
            owner_id: poll.owner_id,
            question: poll.question,
            options,
            likes: poll.likes,
            created_at: poll.created_at,
            updated_at: poll.updated_at,
        }
    }
}
