//! Health check handler

use axum::extract::State;
use axum::Json;
use gatekeep_types::HealthResponse;

use crate::state::AppState;

/// GET /api/health - Liveness probe (fast, no dependencies)
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime: state.uptime().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
