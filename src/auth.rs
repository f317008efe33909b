use crate::db;
use crate::error::ApiError;
use crate::startup::AppState;
use axum::{
    async_trait,
    extract::{Extension, FromRequestParts, Json},
    http::{header::AUTHORIZATION, request::Parts},
    response::IntoResponse,
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
}

pub fn create_access_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    exp_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: Utc::now().timestamp() + exp_seconds as i64,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// The authenticated caller, resolved from the `Authorization: Bearer`
/// header. The rest of the application only ever sees the stable user id.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let app_state = parts
            .extensions
            .get::<AppState>()
            .cloned()
            .ok_or(ApiError::Internal)?;

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthenticated)?;

        let claims = decode_token(&app_state.config.jwt_secret, token)?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Exchange a verified identity for an access token, creating the user
/// document on first login.
pub async fn login(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.email.is_empty() || !payload.email.contains('@') {
        return Err(ApiError::InvalidRequest(
            "a valid email is required".to_string(),
        ));
    }

    let user = db::upsert_user(
        &app_state.db,
        &payload.email,
        payload.name.as_deref(),
        payload.picture.as_deref(),
    )
    .await?;

    let token = create_access_token(
        &app_state.config.jwt_secret,
        user.id,
        &user.email,
        app_state.config.jwt_exp_seconds,
    )
    .map_err(|_| ApiError::TokenCreation)?;

    info!(user_id = %user.id, "user logged in");

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
    }))
}

/// Profile of the authenticated user
pub async fn me(
    Extension(app_state): Extension<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = db::get_user(&app_state.db, user.user_id)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    Ok(Json(user))
}
