//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Users with at least one live realtime channel
    pub online_users: usize,
    /// Users with a match recompute running or queued
    pub active_recomputes: usize,
}

/// GET /health
///
/// Does not require authentication.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "tunelink-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        online_users: state.registry.online_users(),
        active_recomputes: state.engine.gate().active_users(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
