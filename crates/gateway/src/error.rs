//! Coordinator and API error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use huddle_shared::{HuddleError, RoomId};
use serde_json::json;

/// Errors raised by the coordination core.
///
/// These are returned only to the requesting connection or HTTP caller and
/// never broadcast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),
    #[error("Room is full: {0}")]
    RoomFull(RoomId),
    #[error("Not authorized to act on behalf of another user")]
    NotAuthorized,
    #[error("Target is not reachable")]
    TargetUnreachable,
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoordinatorError {
    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::AuthenticationFailed => "AUTHENTICATION_FAILED",
            CoordinatorError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            CoordinatorError::RoomFull(_) => "ROOM_FULL",
            CoordinatorError::NotAuthorized => "NOT_AUTHORIZED",
            CoordinatorError::TargetUnreachable => "TARGET_UNREACHABLE",
            CoordinatorError::InvalidEvent(_) => "INVALID_EVENT",
            CoordinatorError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<HuddleError> for CoordinatorError {
    fn from(err: HuddleError) -> Self {
        tracing::error!(error = %err, "Storage error");
        CoordinatorError::Storage(err.to_string())
    }
}

/// Result type alias for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// HTTP error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Coordinator(err) => {
                let status = match err {
                    CoordinatorError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
                    CoordinatorError::RoomNotFound(_) => StatusCode::NOT_FOUND,
                    CoordinatorError::RoomFull(_) => StatusCode::CONFLICT,
                    CoordinatorError::NotAuthorized => StatusCode::FORBIDDEN,
                    CoordinatorError::TargetUnreachable => StatusCode::NOT_FOUND,
                    CoordinatorError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
                    CoordinatorError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = match err {
                    CoordinatorError::Storage(_) => "Storage error".to_string(),
                    other => other.to_string(),
                };
                (status, err.code(), message)
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
