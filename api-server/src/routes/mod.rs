//! Route handlers

pub mod chat;
pub mod health;

use axum::{http::StatusCode, Json, Router};
use serde::Serialize;
use tracing::warn;

use agent_runner::{ExecutorError, SchedulerError};
use agentweb_core::Error as CoreError;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a runner failure onto an HTTP status
pub fn executor_error(err: ExecutorError) -> ApiError {
    let status = match &err {
        ExecutorError::Core(CoreError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
        ExecutorError::Core(CoreError::InvalidAgentKind(_) | CoreError::InvalidWorkingDir(_)) => {
            StatusCode::BAD_REQUEST
        }
        ExecutorError::Scheduler(SchedulerError::QueueFull { .. } | SchedulerError::Closed) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", err);
    }
    error_response(status, err.to_string())
}

/// All API routes, without state or middleware
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(chat::router())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (
                ExecutorError::from(CoreError::SessionNotFound("s".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ExecutorError::from(CoreError::InvalidWorkingDir(PathBuf::from("/nope"))),
                StatusCode::BAD_REQUEST,
            ),
            (
                ExecutorError::from(CoreError::InvalidAgentKind("GPT".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ExecutorError::from(SchedulerError::QueueFull { capacity: 1 }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ExecutorError::configuration("Executable not configured for CODEX"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ExecutorError::spawn_failed(
                    "Failed to spawn agent",
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let message = err.to_string();
            let (status, Json(body)) = executor_error(err);
            assert_eq!(status, expected);
            assert_eq!(body.error, message);
        }
    }
}
