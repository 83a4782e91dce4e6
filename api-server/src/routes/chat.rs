//! Chat session endpoints
//!
//! Sessions bind an agent kind to a working directory. Messages either run to
//! completion (`POST .../message`) or are streamed as server-sent events
//! (`GET .../message/stream`).

use std::convert::Infallible;
use std::str::FromStr;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;

use agent_runner::{ExecutorError, StreamEvent};
use agentweb_core::{AgentKind, Session};

use super::{error_response, executor_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub agent_type: String,
    pub working_dir: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub agent_type: AgentKind,
    pub working_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    /// Transcript: `[exit=N]` line followed by the combined output
    pub output: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub message: String,
    pub resume_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

fn require_message(message: &str) -> Result<(), ApiError> {
    if message.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "message must not be blank"));
    }
    Ok(())
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| error_response(rejection.status(), rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| error_response(rejection.status(), rejection.body_text()))
}

fn session_response(session: Session) -> SessionResponse {
    SessionResponse {
        session_id: session.id,
        agent_type: session.agent_kind,
        working_dir: session.working_dir.to_string_lossy().into_owned(),
    }
}

/// POST /api/chat/session - Open a session in a working directory
async fn start_session(
    State(state): State<AppState>,
    body: Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let req = json_body(body)?;
    let kind = AgentKind::from_str(&req.agent_type)
        .map_err(|e| executor_error(ExecutorError::from(e)))?;
    if req.working_dir.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "workingDir must not be blank"));
    }

    let session = state
        .chat()
        .start_session(kind, &req.working_dir)
        .await
        .map_err(executor_error)?;

    Ok(Json(session_response(session)))
}

/// GET /api/chat/session/{id} - Look up a session
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .chat()
        .get_session(&session_id)
        .await
        .map_err(executor_error)?;
    Ok(Json(session_response(session)))
}

/// DELETE /api/chat/session/{id} - Close a session
async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .chat()
        .close_session(&session_id)
        .await
        .map_err(executor_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/chat/session/{id}/message - Run one message to completion
async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let req = json_body(body)?;
    require_message(&req.message)?;

    let result = state
        .chat()
        .send_message(&session_id, &req.message)
        .await
        .map_err(executor_error)?;
    info!(
        "Session {} message finished with exit {} (timed out: {})",
        session_id, result.exit_code, result.timed_out
    );

    Ok(Json(MessageResponse {
        output: result.transcript(),
        exit_code: result.exit_code,
        timed_out: result.timed_out,
    }))
}

fn to_sse(event: StreamEvent) -> Result<Event, Infallible> {
    Ok(Event::default().event(event.name()).data(event.data()))
}

/// GET /api/chat/session/{id}/message/stream - Stream one message as SSE
///
/// Dropping the connection drops the event receiver, which stops the run.
async fn stream_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let query = query_params(query)?;
    require_message(&query.message)?;

    let events = state
        .chat()
        .stream_message(&session_id, &query.message, query.resume_id)
        .await
        .map_err(executor_error)?;

    Ok(Sse::new(events.map(to_sse)).keep_alive(KeepAlive::default()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat/session", post(start_session))
        .route("/api/chat/session/{id}", get(get_session).delete(close_session))
        .route("/api/chat/session/{id}/message", post(send_message))
        .route("/api/chat/session/{id}/message/stream", get(stream_message))
}
