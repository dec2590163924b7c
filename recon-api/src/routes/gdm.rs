//! Whole-GDM endpoints
//!
//! `GET /gdm` serves the expanded deployment set with an order-insensitive
//! etag. `PUT /gdm` is the bulk intent write used by the state client: the
//! submitted deployments are gathered back into manifests and written under
//! optimistic concurrency, with etag mismatches resolved through body
//! variances so that a semantically identical write is a no-op rather than
//! a conflict.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use recon_core::logging::operations;
use recon_core::State as GdmState;

use crate::dto::{user_from_headers, GdmWrapper, NameData, ServerListData};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn wrapper_response(status: StatusCode, wrapper: GdmWrapper) -> Response {
    let mut headers = HeaderMap::new();
    wrapper.add_headers(&mut headers);
    (status, headers, Json(wrapper)).into_response()
}

/// Serve the expanded deployment set
pub async fn get_gdm(State(state): State<AppState>) -> ApiResult<Response> {
    let gdm = state.state_manager.read_state().await?;
    let deployments = gdm.deployments()?;
    Ok(wrapper_response(
        StatusCode::OK,
        GdmWrapper::from_deployments(&deployments),
    ))
}

/// Replace the deployment set wholesale
pub async fn put_gdm(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(submitted): Json<GdmWrapper>,
) -> ApiResult<Response> {
    let current = state.state_manager.read_state().await?;
    let current_wrapper = GdmWrapper::from_deployments(&current.deployments()?);

    if let Some(if_match) = headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok()) {
        if if_match != current_wrapper.etag() {
            // The token is stale; only a semantically different body is a
            // real conflict.
            let variances = submitted.variances_from(&current_wrapper);
            if !variances.is_empty() {
                return Err(ApiError::Conflict(format!(
                    "state has changed since read: {}",
                    variances.join("; ")
                )));
            }
            return Ok(wrapper_response(StatusCode::OK, current_wrapper));
        }
    }

    if submitted.variances_from(&current_wrapper).is_empty() {
        return Ok(wrapper_response(StatusCode::OK, current_wrapper));
    }

    let deployments = submitted.to_deployments()?;
    let manifests = deployments.manifests(&current.defs)?;
    let next = GdmState {
        manifests,
        defs: current.defs,
    };

    let user = user_from_headers(&headers);
    state.state_manager.write_state(&next, &user).await?;
    tracing::info!(
        operation = operations::STATE_WRITE,
        user = %user.name,
        deployments = submitted.deployments.len(),
        "GDM replaced"
    );

    let deployments = next.deployments()?;
    Ok(wrapper_response(
        StatusCode::OK,
        GdmWrapper::from_deployments(&deployments),
    ))
}

/// Serve the raw manifest set
pub async fn get_manifests(State(state): State<AppState>) -> ApiResult<Json<recon_core::Manifests>> {
    let gdm = state.state_manager.read_state().await?;
    Ok(Json(gdm.manifests))
}

/// Serve the cluster definitions
pub async fn get_defs(State(state): State<AppState>) -> ApiResult<Json<recon_core::Defs>> {
    let gdm = state.state_manager.read_state().await?;
    Ok(Json(gdm.defs))
}

/// Serve the cluster name/URL listing
pub async fn get_servers(State(state): State<AppState>) -> ApiResult<Json<ServerListData>> {
    let gdm = state.state_manager.read_state().await?;
    let servers = gdm
        .defs
        .clusters
        .iter()
        .filter_map(|(name, cluster)| {
            cluster.as_ref().map(|c| NameData {
                cluster_name: name.clone(),
                url: c.base_url.clone(),
            })
        })
        .collect();
    Ok(Json(ServerListData { servers }))
}
