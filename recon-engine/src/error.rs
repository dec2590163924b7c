//! Engine error types

use thiserror::Error;

use recon_core::{DeployError, DeploymentId, SourceId};

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the reconciliation engine
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// A deployment-model operation failed
    #[error(transparent)]
    Deploy(#[from] DeployError),

    /// The registry could not produce an artifact
    #[error("artifact lookup for {source_id} failed: {message}")]
    ArtifactLookup { source_id: SourceId, message: String },

    /// The per-deployment rectification queue is at capacity
    #[error("rectification queue for {0} is full")]
    QueueFull(DeploymentId),

    /// The downstream orchestrator could not report its state
    #[error("orchestrator state fetch failed: {0}")]
    OrchestratorUnavailable(String),

    /// A resolution cycle failed as a whole
    #[error("resolution cycle failed: {0}")]
    CycleFailed(String),
}

impl EngineError {
    /// Short machine-stable error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Deploy(e) => e.code(),
            Self::ArtifactLookup { .. } => "ArtifactLookup",
            Self::QueueFull(_) => "QueueFull",
            Self::OrchestratorUnavailable(_) => "OrchestratorUnavailable",
            Self::CycleFailed(_) => "CycleFailed",
        }
    }
}
