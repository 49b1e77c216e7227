use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use townsquare_core::error::CoreError;
use townsquare_db::DbError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("user already voted")]
    AlreadyVoted,
    #[error("poll has expired")]
    PollExpired,
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Machine-readable error code string.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::AlreadyVoted => "ALREADY_VOTED",
            ApiError::PollExpired => "POLL_EXPIRED",
            ApiError::InvalidOption(_) => "INVALID_OPTION",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::AlreadyVoted | ApiError::PollExpired => StatusCode::FORBIDDEN,
            ApiError::InvalidOption(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        let message = match &self {
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                "internal server error".to_string()
            }
            ApiError::ServiceUnavailable(reason) => {
                tracing::warn!("API service unavailable: {reason}");
                "service temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "code": code,
            "message": message,
            // Same text under "error", the key the original poll service used
            "error": message,
            "details": Value::Null,
        });

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound => ApiError::NotFound,
            CoreError::BadRequest(msg) => ApiError::BadRequest(msg),
            CoreError::InvalidOption(option) => ApiError::InvalidOption(option),
            CoreError::AlreadyVoted => ApiError::AlreadyVoted,
            CoreError::PollExpired => ApiError::PollExpired,
            CoreError::Database(db) => db.into(),
            CoreError::Internal(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// Malformed or mistyped JSON bodies are client errors like any other bad
/// input, reported with the usual error body instead of axum's plain text.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => ApiError::NotFound,
            ref transient if transient.is_transient() => {
                ApiError::ServiceUnavailable(transient.to_string())
            }
            other => ApiError::Internal(anyhow::anyhow!("database error: {other}")),
        }
    }
}
