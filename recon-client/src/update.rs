//! The conflict-retry update loop
//!
//! Concurrent updates to different clusters of one manifest can interleave
//! their read/modify/write sequences; the loser sees a conflict. The retry
//! budget is the number of deploy-specs in the manifest, floored at two:
//! with N clusters racing, N-1 retries suffice for everyone to land. This
//! is the only retry policy in the system; everything else either succeeds,
//! resolves, or reports.

use std::time::Instant;

use recon_core::logging::operations;
use recon_core::{Deployments, DeploymentId, SourceId, StateManager, User};

use crate::error::{ClientError, ClientResult};

/// Point one deployment at a new source id, retrying under write conflicts.
///
/// Returns the realized deployment set after the successful write.
pub async fn update_retry_loop(
    sm: &dyn StateManager,
    sid: &SourceId,
    did: &DeploymentId,
    user: &User,
) -> ClientResult<Deployments> {
    let mut try_limit = 2;
    let mut tries = 0;
    let start = Instant::now();

    while tries < try_limit {
        tracing::debug!(
            operation = operations::UPDATE,
            deployment_id = %did,
            source_id = %sid,
            user = %user.name,
            attempt = tries,
            "update attempt"
        );

        let mut state = sm.read_state().await?;

        let manifest = state
            .manifests
            .get(&did.manifest_id)
            .ok_or_else(|| ClientError::ManifestMissing(did.manifest_id.clone()))?;
        try_limit = manifest.deployments.len().max(2);

        let gdm = state.deployments()?;
        let mut deployment = gdm.get(did).cloned().unwrap_or_default();
        deployment.source_id = sid.clone();
        deployment.cluster_name = did.cluster.clone();

        state.update_deployments(vec![deployment])?;

        match sm.write_state(&state, user).await {
            Ok(()) => {
                tracing::info!(
                    operation = operations::UPDATE,
                    deployment_id = %did,
                    source_id = %sid,
                    duration_ms = start.elapsed().as_millis() as u64,
                    attempt = tries,
                    "update succeeded"
                );
                return Ok(state.deployments()?);
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(
                    operation = operations::UPDATE,
                    deployment_id = %did,
                    error = %err,
                    attempt = tries,
                    "update conflicted, retrying"
                );
                tries += 1;
            }
            Err(err) => {
                tracing::warn!(
                    operation = operations::UPDATE,
                    deployment_id = %did,
                    error = %err,
                    "update failed"
                );
                return Err(err.into());
            }
        }
    }

    Err(ClientError::UpdateExhausted {
        tries: try_limit,
        deployment_id: did.clone(),
    })
}
