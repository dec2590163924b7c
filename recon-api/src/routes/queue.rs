//! Rectification queue endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use recon_engine::R11nState;

use crate::dto::{DeploymentQueuesResponse, QueueDesc, QueueItemResponse};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters naming one queued action.
#[derive(Debug, Deserialize)]
pub struct QueueItemQuery {
    /// The opaque action id returned at enqueue time
    pub action: String,
}

/// Serve the state of one queued deploy action
pub async fn get_queue_item(
    State(state): State<AppState>,
    Query(query): Query<QueueItemQuery>,
) -> ApiResult<Json<QueueItemResponse>> {
    let id = query
        .action
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid action id.".to_string()))?;

    match state.queues.status(&id).await {
        None => Err(ApiError::NotFound(format!(
            "No queued action {}.",
            query.action
        ))),
        Some(R11nState::Queued) => Ok(Json(QueueItemResponse {
            action: query.action,
            state: "queued".to_string(),
            resolution: None,
        })),
        Some(R11nState::Resolved(resolution)) => Ok(Json(QueueItemResponse {
            action: query.action,
            state: "resolved".to_string(),
            resolution: Some(resolution),
        })),
    }
}

/// Serve the per-deployment queue lengths
pub async fn get_queues(State(state): State<AppState>) -> Json<DeploymentQueuesResponse> {
    let queues = state
        .queues
        .queue_lens()
        .await
        .into_iter()
        .map(|(id, length)| {
            let key = id.to_string();
            (
                key.clone(),
                QueueDesc {
                    deployment_id: key,
                    length,
                },
            )
        })
        .collect();
    Json(DeploymentQueuesResponse { queues })
}
