//! Deployment model types

pub mod cluster;
pub mod deploy_config;
pub mod deployment;
pub mod ids;
pub mod manifest;

pub use cluster::{Cluster, Defs};
pub use deploy_config::{ConfigFlaw, DeployConfig, Env, Metadata, Resources, Startup, Volume, Volumes};
pub use deployment::{
    BuildArtifact, Deployable, DeployablePair, Deployment, Deployments, DeployStatus,
    DiffResolution, PairKind, Quality, QueuedR11n, R11nId, Rectification, ResolutionType,
};
pub use ids::{DeploymentId, ManifestId, SourceId, SourceLocation};
pub use manifest::{DeploySpec, Manifest, ManifestKind, Manifests, OwnerSet, GLOBAL_SPEC_KEY};
