//! Name resolution
//!
//! A stateless pipeline stage that makes sure the post side of every Added
//! or Modified pair carries a valid build artifact before it reaches the
//! executor. Failures become resolutions, never cycle errors.

use std::sync::Arc;

use async_trait::async_trait;

use recon_core::logging::operations;
use recon_core::{
    BuildArtifact, Deployable, DeployablePair, Deployment, DiffResolution, ErrorWrapper,
    PairKind, ResolutionType, ResolveError,
};

use crate::pipeline::{PairOutcome, PairProcessor};
use crate::registry::Registry;

/// Pipeline stage that attaches build artifacts to intended deployments.
pub struct NameResolver {
    registry: Arc<dyn Registry>,
}

impl NameResolver {
    /// Create a resolver over a registry
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    /// Look up and vet the artifact for an intended deployment.
    ///
    /// Zero-instance deployments skip the artifact check unconditionally:
    /// nothing will be launched, so nothing needs an image. Otherwise the
    /// registry is consulted and every advisory on the returned artifact
    /// must be allow-listed by the target cluster.
    async fn guard_artifact(
        &self,
        deployment: &Deployment,
    ) -> Result<Option<BuildArtifact>, ResolveError> {
        if deployment.deploy_config.num_instances == 0 {
            tracing::info!(
                operation = operations::RESOLVE_NAME,
                deployment_id = %deployment.id(),
                "deployment has 0 instances, skipping artifact check"
            );
            return Ok(None);
        }
        if deployment.cluster.name.is_empty() {
            return Err(ResolveError::ClusterMissing(deployment.id()));
        }

        let artifact = self
            .registry
            .get_artifact(&deployment.source_id)
            .await
            .map_err(|e| ResolveError::MissingImage {
                source_id: deployment.source_id.clone(),
                cause: e.to_string(),
            })?;

        for advisory in artifact.advisories() {
            if !deployment.cluster.allows_advisory(advisory) {
                return Err(ResolveError::UnacceptableAdvisory {
                    advisory: advisory.to_string(),
                    source_id: deployment.source_id.clone(),
                });
            }
        }
        Ok(Some(artifact))
    }
}

#[async_trait]
impl PairProcessor for NameResolver {
    async fn handle_pair(&self, pair: DeployablePair) -> PairOutcome {
        let kind = pair.kind();
        match kind {
            // Nothing will be launched for these; image names are moot.
            PairKind::Same | PairKind::Removed => PairOutcome::Proceed(pair),
            PairKind::Added | PairKind::Modified => {
                let post = pair
                    .post
                    .as_ref()
                    .expect("added/modified pair has a post side");
                match self.guard_artifact(&post.deployment).await {
                    Ok(artifact) => {
                        let post = Deployable {
                            artifact,
                            ..post.clone()
                        };
                        PairOutcome::Proceed(DeployablePair {
                            post: Some(post),
                            ..pair
                        })
                    }
                    Err(err) => {
                        tracing::info!(
                            operation = operations::RESOLVE_NAME,
                            deployment_id = %pair.id,
                            pair_kind = %kind,
                            error = %err,
                            "unable to {} deployment",
                            kind.resolve_verb()
                        );
                        let desc = match kind {
                            PairKind::Added => ResolutionType::NotCreated,
                            _ => ResolutionType::Errored,
                        };
                        PairOutcome::Resolved(DiffResolution::errored(
                            pair.id,
                            desc,
                            ErrorWrapper::from(&err),
                        ))
                    }
                }
            }
        }
    }
}
