//! Single-deployment endpoints
//!
//! The PUT exchange is the interactive deploy path: write the new spec to
//! the GDM, re-expand to recover the full deployment, and enqueue a
//! rectification whose queue item the response links to. All failure modes
//! report through the body's `meta` so callers always get the same shape.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use recon_core::logging::operations;
use recon_core::{
    Deployable, DeployablePair, DeploymentId, DeploySpec, DeployStatus, ManifestId, Rectification,
    SourceLocation,
};

use crate::dto::{user_from_headers, SingleDeploymentBody};
use crate::state::AppState;

/// Query parameters identifying one deployment.
#[derive(Debug, Deserialize)]
pub struct SingleDeploymentQuery {
    /// Repository URL
    pub repo: String,
    /// Offset directory within the repository
    #[serde(default)]
    pub offset: String,
    /// Cluster name
    pub cluster: String,
    /// Manifest flavor
    #[serde(default)]
    pub flavor: String,
}

impl SingleDeploymentQuery {
    fn deployment_id(&self) -> DeploymentId {
        DeploymentId {
            manifest_id: ManifestId {
                source: SourceLocation::new(self.repo.clone(), self.offset.clone()),
                flavor: self.flavor.clone(),
            },
            cluster: self.cluster.clone(),
        }
    }
}

fn respond(status: StatusCode, mut body: SingleDeploymentBody) -> Response {
    body.meta.status_code = status.as_u16();
    let mut headers = HeaderMap::new();
    body.add_headers(&mut headers);
    (status, headers, Json(body)).into_response()
}

fn respond_err(status: StatusCode, message: String) -> Response {
    let body = SingleDeploymentBody {
        meta: crate::dto::ResponseMeta {
            error: Some(message),
            ..Default::default()
        },
        ..Default::default()
    };
    respond(status, body)
}

/// Serve one deployment, identified by query parameters.
pub async fn get_single_deployment(
    State(state): State<AppState>,
    query: Result<Query<SingleDeploymentQuery>, QueryRejection>,
) -> Response {
    let Ok(Query(query)) = query else {
        return respond_err(
            StatusCode::BAD_REQUEST,
            "Invalid deployment ID in query.".to_string(),
        );
    };
    let did = query.deployment_id();

    let gdm = match state.state_manager.read_state().await {
        Ok(gdm) => gdm,
        Err(err) => {
            return respond_err(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read state: {err}."),
            )
        }
    };

    let Some(manifest) = gdm.manifests.get(&did.manifest_id) else {
        return respond_err(
            StatusCode::NOT_FOUND,
            format!("No manifest with ID {}.", did.manifest_id),
        );
    };
    if !manifest.deployments.contains_key(&did.cluster) {
        return respond_err(
            StatusCode::NOT_FOUND,
            format!("No {:?} deployment defined for {}.", did.cluster, did),
        );
    }

    let deployment = match gdm.deployments() {
        Ok(ds) => ds.get(&did).cloned(),
        Err(err) => {
            return respond_err(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Unable to expand GDM: {err}."),
            )
        }
    };
    let Some(deployment) = deployment else {
        return respond_err(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Deployment failed to round-trip to GDM.".to_string(),
        );
    };

    respond(
        StatusCode::OK,
        SingleDeploymentBody {
            deployment,
            ..Default::default()
        },
    )
}

/// Update one deployment's spec and queue the rectification.
pub async fn put_single_deployment(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<SingleDeploymentQuery>, QueryRejection>,
    body: Result<Json<SingleDeploymentBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(err) => {
            return respond_err(
                StatusCode::BAD_REQUEST,
                format!("Invalid deployment: error parsing body: {err}."),
            )
        }
    };
    let Ok(Query(query)) = query else {
        return respond_err(
            StatusCode::BAD_REQUEST,
            "Invalid deployment ID in query.".to_string(),
        );
    };
    let did = query.deployment_id();

    let mut gdm = match state.state_manager.read_state().await {
        Ok(gdm) => gdm,
        Err(err) => {
            return respond_err(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read state: {err}."),
            )
        }
    };

    let Some(manifest) = gdm.manifests.get_mut(&did.manifest_id) else {
        return respond_err(
            StatusCode::NOT_FOUND,
            format!("No manifest with ID {}.", did.manifest_id),
        );
    };
    let Some(current_spec) = manifest.deployments.get(&did.cluster) else {
        return respond_err(
            StatusCode::NOT_FOUND,
            format!("No {:?} deployment defined for {}.", did.cluster, did),
        );
    };

    let mut submitted = DeploySpec {
        version: body.deployment.source_id.version.clone(),
        deploy_config: body.deployment.deploy_config.clone(),
    };
    let flaws = submitted.deploy_config.repair();
    if !flaws.is_empty() {
        let reasons: Vec<String> = flaws.iter().map(|f| f.to_string()).collect();
        return respond_err(
            StatusCode::BAD_REQUEST,
            format!("Invalid deployment: {}.", reasons.join("; ")),
        );
    }

    if submitted.equal(current_spec) {
        return respond(StatusCode::OK, body);
    }

    manifest.deployments.insert(did.cluster.clone(), submitted);

    let user = user_from_headers(&headers);
    if let Err(err) = state.state_manager.write_state(&gdm, &user).await {
        return respond_err(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to write state: {err}."),
        );
    }

    // The full deployment only exists in the realized GDM: it depends on
    // the cluster defs, which are not part of this exchange.
    let deployments = match gdm.deployments() {
        Ok(ds) => ds,
        Err(err) => {
            return respond_err(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Unable to expand GDM: {err}."),
            )
        }
    };
    let Some(full_deployment) = deployments.get(&did).cloned() else {
        return respond_err(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Deployment failed to round-trip to GDM.".to_string(),
        );
    };

    let rectification = Rectification::new(DeployablePair {
        id: did.clone(),
        prior: None,
        post: Some(Deployable {
            status: DeployStatus::Unknown,
            deployment: full_deployment.clone(),
            artifact: None,
        }),
        executor_data: None,
    });

    let Some(queued) = state.queues.push(rectification).await else {
        return respond_err(
            StatusCode::CONFLICT,
            "Queue full, please try again later.".to_string(),
        );
    };
    tracing::info!(
        operation = operations::QUEUE_PUSH,
        deployment_id = %did,
        action_id = %queued.id,
        user = %user.name,
        "deploy action queued"
    );

    let mut response_body = SingleDeploymentBody {
        deployment: full_deployment,
        ..Default::default()
    };
    response_body.meta.links.insert(
        "queuedDeployAction".to_string(),
        format!("/deploy-queue-item?action={}", queued.id),
    );
    respond(StatusCode::CREATED, response_body)
}
