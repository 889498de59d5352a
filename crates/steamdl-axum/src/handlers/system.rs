//! System status handler.

use axum::Json;
use axum::extract::State;
use steamdl_core::SystemSnapshot;

use crate::state::AppState;

/// Job counts, capacity and host metrics, recomputed per request.
pub async fn snapshot(State(state): State<AppState>) -> Json<SystemSnapshot> {
    Json(state.reporter.snapshot().await)
}
