//! Resolve status endpoint

use axum::{extract::State, Json};

use crate::dto::StatusResponse;
use crate::state::AppState;

/// Serve the stable and live resolve status snapshots.
///
/// Both are null until an auto-resolver is attached and has completed or
/// started a cycle.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let (stable, live) = match &state.auto_resolver {
        Some(handle) => handle.statuses().await,
        None => (None, None),
    };
    Json(StatusResponse { stable, live })
}
