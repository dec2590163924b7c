//! Error types for the deployment model
//!
//! Two families live here. [`DeployError`] is the fallible-operation error
//! for state reads, writes and the flatten/gather algebra; its `code()` is
//! the machine-stable type surfaced to HTTP clients. [`ResolveError`] is the
//! non-fatal, per-pair failure carried inside a `DiffResolution` so that one
//! bad pair never aborts a resolution cycle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DeploymentId, ManifestId, SourceId};

/// Result type for deployment model operations
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors raised by state handling and the manifest algebra
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// A manifest names a cluster absent from the cluster definitions
    #[error("cluster {cluster:?} is not described in the cluster defs (referenced by manifest {manifest})")]
    ClusterUnknown { cluster: String, manifest: ManifestId },

    /// The cluster registry carries an explicit null entry
    #[error("cluster {0:?} has a null definition, check the cluster defs")]
    ClusterNil(String),

    /// Two manifests flattened to the same deployment id
    #[error("conflicting deployments for {0}")]
    ConflictingDeployment(DeploymentId),

    /// No manifest with the given id
    #[error("no manifest with ID {0}")]
    ManifestMissing(ManifestId),

    /// The manifest exists but has no spec for the named cluster
    #[error("no {cluster:?} deployment defined for {manifest}")]
    DeploySpecMissing { manifest: ManifestId, cluster: String },

    /// A deployment id was absent after a state round trip
    #[error("deployment {0} failed to round-trip through the manifest set")]
    RoundTripFailed(DeploymentId),

    /// Structural problem in a submitted manifest or config
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// An identifier string failed to parse
    #[error("invalid {kind}: {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },

    /// Optimistic concurrency failure on a state write
    #[error("state write conflict: {0}")]
    Conflict(String),

    /// Network or timeout failure talking to the state store
    #[error("transport failure: {0}")]
    Transport(String),

    /// State store failure
    #[error("storage failure: {0}")]
    Storage(String),

    /// Serialization failure
    #[error("serialization failure: {0}")]
    Serialization(String),
}

impl DeployError {
    /// Short machine-stable error type, embedded in HTTP response meta.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClusterUnknown { .. } => "ClusterUnknown",
            Self::ClusterNil(_) => "ClusterNil",
            Self::ConflictingDeployment(_) => "ConflictingDeployment",
            Self::ManifestMissing(_) => "ManifestMissing",
            Self::DeploySpecMissing { .. } => "DeploySpecMissing",
            Self::RoundTripFailed(_) => "RoundTripFailed",
            Self::Validation { .. } => "Validation",
            Self::InvalidIdentifier { .. } => "InvalidIdentifier",
            Self::Conflict(_) => "Conflict",
            Self::Transport(_) => "Transport",
            Self::Storage(_) => "Storage",
            Self::Serialization(_) => "Serialization",
        }
    }

    /// Whether a write that failed with this error is worth retrying.
    ///
    /// Only optimistic-concurrency conflicts qualify; everything else is
    /// either permanent or the caller's problem.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::Serialization(err.to_string())
    }
}

/// Per-pair resolution failure, carried inside a `DiffResolution`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The registry has no artifact for the intended source id
    #[error("no artifact for {source_id}: {cause}")]
    MissingImage { source_id: SourceId, cause: String },

    /// The artifact carries an advisory the target cluster does not allow
    #[error("artifact for {source_id} carries disallowed advisory {advisory:?}")]
    UnacceptableAdvisory { advisory: String, source_id: SourceId },

    /// The executor panicked while applying a rectification
    #[error("executor crashed: {0}")]
    ExecutorCrash(String),

    /// A deployment reached name resolution without a materialised cluster
    #[error("no cluster materialised on deployment {0}")]
    ClusterMissing(DeploymentId),

    /// Failure reading intended or actual state for a cycle
    #[error("failed to read state: {0}")]
    StateRead(String),
}

impl ResolveError {
    /// Short machine-stable error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingImage { .. } => "MissingImage",
            Self::UnacceptableAdvisory { .. } => "UnacceptableAdvisory",
            Self::ExecutorCrash(_) => "ExecutorCrash",
            Self::ClusterMissing(_) => "ClusterMissing",
            Self::StateRead(_) => "StateRead",
        }
    }
}

/// Serializable error form embedded in diff resolutions and response bodies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorWrapper {
    /// Machine-stable error type
    #[serde(rename = "Type")]
    pub kind: String,
    /// Human-readable message
    #[serde(rename = "String")]
    pub message: String,
}

impl ErrorWrapper {
    /// Wrap an arbitrary error type and message
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<&ResolveError> for ErrorWrapper {
    fn from(err: &ResolveError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<&DeployError> for ErrorWrapper {
    fn from(err: &DeployError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl std::fmt::Display for ErrorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceLocation;

    #[test]
    fn test_only_conflict_is_retryable() {
        assert!(DeployError::Conflict("etag mismatch".into()).is_retryable());
        assert!(!DeployError::Transport("timeout".into()).is_retryable());
        assert!(!DeployError::Storage("disk".into()).is_retryable());
    }

    #[test]
    fn test_error_wrapper_from_resolve_error() {
        let sid = SourceLocation::new("github.com/example/one", "")
            .source_id(semver::Version::new(1, 0, 0));
        let err = ResolveError::UnacceptableAdvisory {
            advisory: "unapproved".into(),
            source_id: sid,
        };
        let wrapped = ErrorWrapper::from(&err);
        assert_eq!(wrapped.kind, "UnacceptableAdvisory");
        assert!(wrapped.message.contains("unapproved"));
    }

    #[test]
    fn test_codes_are_stable() {
        let mid = ManifestId::new(SourceLocation::new("github.com/example/one", ""));
        let err = DeployError::ManifestMissing(mid);
        assert_eq!(err.code(), "ManifestMissing");
    }
}
