use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthenticated")]
    Unauthenticated,
    #[error("Forbidden")]
    Forbidden,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Poll not found")]
    PollNotFound,
    #[error("Poll option not found")]
    OptionNotFound,
    #[error("Token creation error")]
    TokenCreation,
    #[error("Internal server error")]
    Internal,
    #[error("Database error: {0}")]
    Database(String),
}

/// Failures inside the event bus: encoding an event, or talking to the
/// backing transport. Per-subscriber delivery failures are contained in the
/// bus itself and never surface here.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("event transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidVar(&'static str, String),
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("database initialization failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("event bus initialization failed: {0}")]
    Bus(#[from] BusError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthenticated"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            ApiError::PollNotFound => (StatusCode::NOT_FOUND, "Poll not found"),
            ApiError::OptionNotFound => (StatusCode::NOT_FOUND, "Poll option not found"),
            ApiError::TokenCreation => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token")
            }
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        ApiError::Database(error.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        ApiError::Unauthenticated
    }
}
