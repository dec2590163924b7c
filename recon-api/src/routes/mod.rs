//! API route handlers

pub mod gdm;
pub mod health;
pub mod queue;
pub mod single_deployment;
pub mod status;

use axum::{
    routing::{get, put},
    Router,
};

use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Whole-GDM resource
        .route("/gdm", get(gdm::get_gdm).put(gdm::put_gdm))
        .route("/manifests", get(gdm::get_manifests))
        .route("/defs", get(gdm::get_defs))
        .route("/servers", get(gdm::get_servers))
        // Single-deployment resource
        .route(
            "/single-deployment",
            put(single_deployment::put_single_deployment).get(single_deployment::get_single_deployment),
        )
        // Rectification queues
        .route("/deploy-queue-item", get(queue::get_queue_item))
        .route("/deploy-queues", get(queue::get_queues))
        // Resolve status
        .route("/status", get(status::get_status))
        .with_state(state)
}
