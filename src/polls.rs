use crate::auth::AuthUser;
use crate::db;
use crate::db::models::PollSnapshot;
use crate::db::repositories::poll_repository::PollFilter;
use crate::error::ApiError;
use crate::realtime::{EventAction, POLLS_CHANNEL, PollEvent};
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePollRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub option_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListPollsQuery {
    pub search: Option<String>,
    pub owner_id: Option<Uuid>,
    pub sort_by: Option<String>,
    /// 1 = ascending, -1 = descending (the default).
    pub order: Option<i32>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PollListResponse {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
    pub results: Vec<PollSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Publish one event describing a committed mutation. The mutation has
/// already succeeded, so a bus failure is logged rather than failing the
/// request.
async fn publish_event(app_state: &AppState, event: PollEvent) {
    if let Err(e) = app_state.bus.publish(POLLS_CHANNEL, &event).await {
        error!(action = event.action.as_str(), "failed to publish event: {e}");
    }
}

/// Create a new poll (authenticated users only)
pub async fn create_poll(
    Extension(app_state): Extension<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.question.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "question must not be empty".to_string(),
        ));
    }
    if payload.options.len() < 2 {
        return Err(ApiError::InvalidRequest(
            "a poll needs at least two options".to_string(),
        ));
    }
    if payload.options.iter().any(|o| o.trim().is_empty()) {
        return Err(ApiError::InvalidRequest(
            "options must not be empty".to_string(),
        ));
    }

    let poll_id =
        db::create_poll(&app_state.db, user.user_id, &payload.question, &payload.options).await?;

    let snapshot = db::get_poll_snapshot(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;

    publish_event(
        &app_state,
        PollEvent::with_snapshot(EventAction::PollCreated, snapshot.clone(), Some(user.user_id)),
    )
    .await;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Get all polls with optional search, filtering, sorting, and pagination
pub async fn list_polls(
    Extension(app_state): Extension<AppState>,
    Query(query): Query<ListPollsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let sort_by = sort_column(query.sort_by.as_deref());
    let descending = query.order.unwrap_or(-1) < 0;

    let filter = PollFilter {
        search: query.search,
        owner_id: query.owner_id,
    };

    let total = db::count_polls(&app_state.db, &filter).await?;
    let offset = i64::from(page - 1) * i64::from(limit);
    let results =
        db::list_polls(&app_state.db, &filter, sort_by, descending, offset, i64::from(limit))
            .await?;

    let total_pages = (total + i64::from(limit) - 1) / i64::from(limit);

    Ok(Json(PollListResponse {
        total,
        page,
        limit,
        total_pages,
        results,
    }))
}

fn sort_column(requested: Option<&str>) -> &'static str {
    match requested {
        Some("likes") => "likes",
        Some("question") => "question",
        Some("updated_at") => "updated_at",
        _ => "created_at",
    }
}

/// Get a specific poll with its options and counts
pub async fn get_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = db::get_poll_snapshot(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;

    Ok(Json(snapshot))
}

/// Update a poll's question (owner only)
pub async fn update_poll(
    Extension(app_state): Extension<AppState>,
    user: AuthUser,
    Path(poll_id): Path<Uuid>,
    Json(payload): Json<UpdatePollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.question.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "question must not be empty".to_string(),
        ));
    }

    let poll = db::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;
    if poll.owner_id != Some(user.user_id) {
        return Err(ApiError::Forbidden);
    }

    db::update_poll_question(&app_state.db, poll_id, &payload.question).await?;

    let snapshot = db::get_poll_snapshot(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;

    publish_event(
        &app_state,
        PollEvent::with_snapshot(EventAction::PollUpdated, snapshot.clone(), Some(user.user_id)),
    )
    .await;

    Ok(Json(snapshot))
}

/// Delete a poll (owner only)
pub async fn delete_poll(
    Extension(app_state): Extension<AppState>,
    user: AuthUser,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let poll = db::get_poll(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;
    if poll.owner_id != Some(user.user_id) {
        return Err(ApiError::Forbidden);
    }

    db::delete_poll(&app_state.db, poll_id).await?;

    publish_event(&app_state, PollEvent::deleted(poll_id, Some(user.user_id))).await;

    Ok(Json(MessageResponse {
        message: "Poll deleted successfully".to_string(),
    }))
}

/// Cast, switch, or withdraw a vote (authenticated users only).
///
/// No prior vote casts one; voting the same option again withdraws it;
/// voting a different option moves it there.
pub async fn vote(
    Extension(app_state): Extension<AppState>,
    user: AuthUser,
    Path(poll_id): Path<Uuid>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if db::get_poll(&app_state.db, poll_id).await?.is_none() {
        return Err(ApiError::PollNotFound);
    }

    let options = db::get_poll_options(&app_state.db, poll_id).await?;
    if !options.iter().any(|option| option.id == payload.option_id) {
        return Err(ApiError::OptionNotFound);
    }

    let (action, message) = match db::find_vote(&app_state.db, poll_id, user.user_id).await? {
        None => {
            db::cast_vote(&app_state.db, poll_id, payload.option_id, user.user_id).await?;
            (EventAction::VoteCast, "Vote registered successfully")
        }
        Some(vote) if vote.option_id == payload.option_id => {
            db::revert_vote(&app_state.db, vote.id, poll_id, vote.option_id).await?;
            (EventAction::VoteReverted, "Vote withdrawn successfully")
        }
        Some(vote) => {
            db::switch_vote(
                &app_state.db,
                vote.id,
                poll_id,
                vote.option_id,
                payload.option_id,
            )
            .await?;
            (EventAction::VoteSwitched, "Vote moved successfully")
        }
    };

    let snapshot = db::get_poll_snapshot(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;

    publish_event(
        &app_state,
        PollEvent::with_snapshot(action, snapshot, Some(user.user_id)),
    )
    .await;

    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

/// Toggle like/unlike on a poll (authenticated users only)
pub async fn like(
    Extension(app_state): Extension<AppState>,
    user: AuthUser,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if db::get_poll(&app_state.db, poll_id).await?.is_none() {
        return Err(ApiError::PollNotFound);
    }

    let action = match db::find_like(&app_state.db, poll_id, user.user_id).await? {
        Some(like_id) => {
            db::remove_like(&app_state.db, like_id, poll_id).await?;
            EventAction::Unliked
        }
        None => {
            db::add_like(&app_state.db, poll_id, user.user_id).await?;
            EventAction::Liked
        }
    };

    let snapshot = db::get_poll_snapshot(&app_state.db, poll_id)
        .await?
        .ok_or(ApiError::PollNotFound)?;

    publish_event(
        &app_state,
        PollEvent::with_snapshot(action, snapshot, Some(user.user_id)),
    )
    .await;

    Ok(Json(MessageResponse {
        message: format!("Poll successfully {}", action.as_str()),
    }))
}
