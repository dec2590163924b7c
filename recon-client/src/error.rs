//! Client error types

use thiserror::Error;

use recon_core::{DeployError, DeploymentId, ManifestId};

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the state client
#[derive(Error, Debug)]
pub enum ClientError {
    /// A deployment-model operation failed
    #[error(transparent)]
    Deploy(#[from] DeployError),

    /// Network failure talking to the server
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an unexpected status
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    /// No manifest exists for the targeted deployment
    #[error("no manifest found for {0}")]
    ManifestMissing(ManifestId),

    /// The conflict-retry budget ran out
    #[error("tried {tries} times to update {deployment_id}")]
    UpdateExhausted {
        tries: usize,
        deployment_id: DeploymentId,
    },
}

impl ClientError {
    /// Short machine-stable error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Deploy(e) => e.code(),
            Self::Transport(_) => "Transport",
            Self::Api { .. } => "Api",
            Self::ManifestMissing(_) => "ManifestMissing",
            Self::UpdateExhausted { .. } => "UpdateExhausted",
        }
    }
}
