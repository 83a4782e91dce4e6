//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    sessions: usize,
    workers: usize,
    queued: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let scheduler = state.chat().scheduler();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.chat().session_count().await,
        workers: scheduler.worker_count(),
        queued: scheduler.queued(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
