//! Health endpoint

use axum::{extract::State, Json};
use serde_json::json;

use crate::state::AppState;

/// Liveness check
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": state.version,
    }))
}
