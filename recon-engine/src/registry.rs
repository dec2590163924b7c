//! Registry interface
//!
//! The container registry is an external collaborator; the engine only
//! needs artifact lookup by source id. The HTTP client with its cache lives
//! outside this workspace and implements this trait; tests supply stubs.

use async_trait::async_trait;

use recon_core::{BuildArtifact, SourceId};

use crate::error::EngineResult;

/// Artifact lookup by versioned source location.
///
/// The registry is the authority for canonical image names; the engine's
/// image-name cache is append-only from this side of the interface.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Resolve the build artifact for a source id.
    ///
    /// Implementations carry their own per-call timeout; a lookup that
    /// cannot produce an artifact returns an error, which the name
    /// resolver surfaces as a `MissingImage` resolution.
    async fn get_artifact(&self, source_id: &SourceId) -> EngineResult<BuildArtifact>;
}
