//! Deployer interface
//!
//! The downstream orchestrator (a Singularity-class scheduler) is driven
//! through this trait: one method reports what actually runs, the other
//! applies a single rectification. Implementations live outside this
//! workspace; the engine never assumes more than this surface.

use async_trait::async_trait;

use recon_core::{Defs, DeployablePair, Deployments, DiffResolution};

use crate::error::EngineResult;

/// The pinned interface to the downstream container orchestrator.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Snapshot the deployments the orchestrator currently runs.
    ///
    /// The snapshot is taken once per resolution cycle and never re-read
    /// mid-cycle.
    async fn running_deployments(&self, defs: &Defs) -> EngineResult<Deployments>;

    /// Apply one rectification, moving actual state toward intended.
    ///
    /// Each pair is attempted once; the outcome (success or failure) is the
    /// returned resolution. Retry policy belongs to the caller.
    async fn rectify(&self, pair: &DeployablePair) -> DiffResolution;
}
