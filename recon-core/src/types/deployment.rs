//! Concrete deployments and the differ's working types
//!
//! A `Deployment` is the flattened, cluster-materialised form of one
//! manifest entry. `Deployable` attaches a resolved build artifact;
//! `DeployablePair` is the prior/post view the differ emits and executors
//! consume; `DiffResolution` is the terminal record of what happened to a
//! pair. `Rectification` and `QueuedR11n` are the queue set's currency.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DeployError, DeployResult, ErrorWrapper};
use crate::types::{Cluster, DeployConfig, DeploymentId, ManifestId, ManifestKind, OwnerSet, SourceId};

/// One concrete service deployment in one cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deployment {
    /// Logical name of the target cluster
    pub cluster_name: String,
    /// The materialised cluster definition; populated during flattening
    #[serde(default)]
    pub cluster: Cluster,
    /// Deploy configuration after Global and cluster-default overlays
    #[serde(default)]
    pub deploy_config: DeployConfig,
    /// The versioned source this deployment runs
    pub source_id: SourceId,
    /// Manifest flavor
    #[serde(default)]
    pub flavor: String,
    /// Owners of the manifest this deployment came from
    #[serde(default)]
    pub owners: OwnerSet,
    /// Workload kind
    #[serde(default)]
    pub kind: ManifestKind,
}

impl Deployment {
    /// The canonical identity of this deployment
    pub fn id(&self) -> DeploymentId {
        DeploymentId {
            manifest_id: self.manifest_id(),
            cluster: self.cluster_name.clone(),
        }
    }

    /// The identity of the manifest this deployment came from
    pub fn manifest_id(&self) -> ManifestId {
        ManifestId {
            source: self.source_id.location.clone(),
            flavor: self.flavor.clone(),
        }
    }

    /// True when the two deployments are structurally equal
    pub fn equal(&self, other: &Deployment) -> bool {
        self.diff(other).is_empty()
    }

    /// List human-readable variances between this deployment and another
    pub fn diff(&self, other: &Deployment) -> Vec<String> {
        let mut diffs = Vec::new();
        if self.cluster_name != other.cluster_name {
            diffs.push(format!(
                "cluster; this: {}; other: {}",
                self.cluster_name, other.cluster_name
            ));
        }
        if self.source_id != other.source_id {
            diffs.push(format!(
                "source id; this: {}; other: {}",
                self.source_id, other.source_id
            ));
        }
        if self.kind != other.kind {
            diffs.push(format!("kind; this: {}; other: {}", self.kind, other.kind));
        }
        if self.owners != other.owners {
            diffs.push("owners differ".to_string());
        }
        diffs.extend(self.deploy_config.diff(&other.deploy_config));
        diffs
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Stable textual form; feeds the order-insensitive etag, so it must
        // not depend on map iteration order (all maps are BTreeMaps).
        write!(f, "{} {} {}", self.id(), self.source_id.version, self.deploy_config)
    }
}

/// The unique mapping of deployment id to deployment.
///
/// Serialized as a sequence of deployments; the keys are derived from the
/// values, so a duplicate id in the wire form fails deserialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Deployments(pub BTreeMap<DeploymentId, Deployment>);

impl Serialize for Deployments {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.values())
    }
}

impl<'de> Deserialize<'de> for Deployments {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<Deployment>::deserialize(deserializer)?;
        let mut ds = Deployments::new();
        for d in list {
            ds.add(d).map_err(serde::de::Error::custom)?;
        }
        Ok(ds)
    }
}

impl Deployments {
    /// Create an empty deployment set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a deployment, rejecting a second deployment with the same id.
    pub fn add(&mut self, deployment: Deployment) -> DeployResult<()> {
        let id = deployment.id();
        if self.0.contains_key(&id) {
            return Err(DeployError::ConflictingDeployment(id));
        }
        self.0.insert(id, deployment);
        Ok(())
    }

    /// Add every deployment from another set, rejecting id collisions.
    pub fn add_all(&mut self, other: Deployments) -> DeployResult<()> {
        for (_, d) in other.0 {
            self.add(d)?;
        }
        Ok(())
    }

    /// Insert or replace under the deployment's id
    pub fn set(&mut self, deployment: Deployment) {
        self.0.insert(deployment.id(), deployment);
    }

    /// Look up by id
    pub fn get(&self, id: &DeploymentId) -> Option<&Deployment> {
        self.0.get(id)
    }

    /// Ids in canonical order
    pub fn keys(&self) -> impl Iterator<Item = &DeploymentId> {
        self.0.keys()
    }

    /// Iterate deployments in id order
    pub fn iter(&self) -> impl Iterator<Item = (&DeploymentId, &Deployment)> {
        self.0.iter()
    }

    /// Number of deployments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no deployments are present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A non-fatal quality attached to a build artifact by the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality {
    /// Quality name, e.g. `ephemeral_tag`
    pub name: String,
    /// Quality kind; `advisory` marks qualities subject to allow-listing
    pub kind: String,
}

impl Quality {
    /// Create an advisory quality
    pub fn advisory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "advisory".to_string(),
        }
    }
}

/// A resolved container image reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Registry-qualified digest or tag
    pub name: String,
    /// Artifact type, e.g. `docker`
    #[serde(default)]
    pub kind: String,
    /// Qualities the registry recorded for this artifact
    #[serde(default)]
    pub qualities: Vec<Quality>,
}

impl BuildArtifact {
    /// Iterate the names of advisory qualities
    pub fn advisories(&self) -> impl Iterator<Item = &str> {
        self.qualities
            .iter()
            .filter(|q| q.kind == "advisory" && !q.name.is_empty())
            .map(|q| q.name.as_str())
    }
}

/// Where a deployment stands with the downstream orchestrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    /// Status not yet determined
    #[default]
    Unknown,
    /// Accepted but not yet running
    Pending,
    /// Running
    Active,
    /// The orchestrator reports failure
    Failed,
}

/// A deployment plus its resolved artifact: the post-name-resolution form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployable {
    /// Orchestrator-side status
    #[serde(default)]
    pub status: DeployStatus,
    /// The deployment itself
    pub deployment: Deployment,
    /// Resolved artifact; absent until name resolution, or for
    /// zero-instance deployments
    #[serde(default)]
    pub artifact: Option<BuildArtifact>,
}

impl Deployable {
    /// Wrap a deployment with no artifact resolved yet
    pub fn new(deployment: Deployment) -> Self {
        Self {
            status: DeployStatus::Unknown,
            deployment,
            artifact: None,
        }
    }

    /// The deployment's identity
    pub fn id(&self) -> DeploymentId {
        self.deployment.id()
    }
}

/// Classification of a prior/post pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairKind {
    /// Intended but not running
    Added,
    /// Running but not intended
    Removed,
    /// Running and intended, configurations differ
    Modified,
    /// Running and intended, configurations agree
    Same,
}

impl PairKind {
    /// The verb the resolver uses when acting on a pair of this kind
    pub fn resolve_verb(&self) -> &'static str {
        match self {
            PairKind::Added => "create",
            PairKind::Removed => "delete",
            PairKind::Modified => "update",
            PairKind::Same => "none",
        }
    }
}

impl fmt::Display for PairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PairKind::Added => "added",
            PairKind::Removed => "removed",
            PairKind::Modified => "modified",
            PairKind::Same => "same",
        };
        write!(f, "{s}")
    }
}

/// A prior/post pair of deployables sharing one deployment id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeployablePair {
    /// The shared deployment id
    pub id: DeploymentId,
    /// What the orchestrator runs now; absent for Added pairs
    pub prior: Option<Deployable>,
    /// What the manifest intends; absent for Removed pairs
    pub post: Option<Deployable>,
    /// Opaque data an executor may thread between pipeline stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_data: Option<serde_json::Value>,
}

impl DeployablePair {
    /// Build a pair from optional sides, taking the id from whichever is set.
    ///
    /// Panics if both sides are absent; the differ never produces that.
    pub fn new(prior: Option<Deployable>, post: Option<Deployable>) -> Self {
        let id = post
            .as_ref()
            .or(prior.as_ref())
            .map(Deployable::id)
            .expect("deployable pair needs at least one side");
        Self {
            id,
            prior,
            post,
            executor_data: None,
        }
    }

    /// Classify this pair
    pub fn kind(&self) -> PairKind {
        match (&self.prior, &self.post) {
            (None, Some(_)) => PairKind::Added,
            (Some(_), None) => PairKind::Removed,
            (Some(prior), Some(post)) => {
                if prior.deployment.equal(&post.deployment) {
                    PairKind::Same
                } else {
                    PairKind::Modified
                }
            }
            (None, None) => PairKind::Same,
        }
    }
}

/// The terminal description of what a resolution cycle did with one pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    /// A new deployment was created
    Created,
    /// An existing deployment was updated
    Updated,
    /// A running deployment was deleted
    Deleted,
    /// Nothing to do
    Unchanged,
    /// Accepted by the orchestrator, still converging
    Coming,
    /// The intended deployment could not be created
    NotCreated,
    /// The action failed; see the error wrapper
    Errored,
}

impl fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionType::Created => "created",
            ResolutionType::Updated => "updated",
            ResolutionType::Deleted => "deleted",
            ResolutionType::Unchanged => "unchanged",
            ResolutionType::Coming => "coming",
            ResolutionType::NotCreated => "not created",
            ResolutionType::Errored => "errored",
        };
        write!(f, "{s}")
    }
}

/// The outcome of resolving one deployable pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResolution {
    /// The deployment the resolution concerns
    pub id: DeploymentId,
    /// What happened
    pub desc: ResolutionType,
    /// The failure, when `desc` warrants one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorWrapper>,
}

impl DiffResolution {
    /// A successful resolution
    pub fn ok(id: DeploymentId, desc: ResolutionType) -> Self {
        Self {
            id,
            desc,
            error: None,
        }
    }

    /// A failed resolution
    pub fn errored(id: DeploymentId, desc: ResolutionType, error: ErrorWrapper) -> Self {
        Self {
            id,
            desc,
            error: Some(error),
        }
    }

    /// True when the resolution carries an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Opaque identifier of a queued rectification action.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct R11nId(String);

impl R11nId {
    /// Generate a fresh action id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for R11nId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for R11nId {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DeployError::InvalidIdentifier {
                kind: "action id",
                value: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

/// A deployable pair the executor must realise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectification {
    /// The pair to act on
    pub pair: DeployablePair,
}

impl Rectification {
    /// Wrap a pair for execution
    pub fn new(pair: DeployablePair) -> Self {
        Self { pair }
    }

    /// The deployment id this rectification targets
    pub fn id(&self) -> DeploymentId {
        self.pair.id.clone()
    }
}

/// A rectification accepted by the queue set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedR11n {
    /// Opaque action id; the handle for `wait` and the queue-item resource
    pub id: R11nId,
    /// Position in the per-deployment queue at enqueue time
    pub position: usize,
    /// The rectification itself
    pub rectification: Rectification,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceLocation;
    use semver::Version;

    fn deployment(repo: &str, cluster: &str, version: Version) -> Deployment {
        Deployment {
            cluster_name: cluster.to_string(),
            cluster: Cluster::new(cluster, format!("http://{cluster}.example.com")),
            source_id: SourceLocation::new(repo, "").source_id(version),
            ..Default::default()
        }
    }

    #[test]
    fn test_deployment_id_ties_source_to_manifest() {
        let d = deployment("github.com/example/one", "cluster-1", Version::new(1, 0, 0));
        assert_eq!(d.id().manifest_id.source, d.source_id.location);
        assert_eq!(d.id().cluster, "cluster-1");
    }

    #[test]
    fn test_conflicting_deployment_rejected() {
        let mut ds = Deployments::new();
        ds.add(deployment("github.com/example/one", "c1", Version::new(1, 0, 0)))
            .unwrap();
        let err = ds
            .add(deployment("github.com/example/one", "c1", Version::new(2, 0, 0)))
            .unwrap_err();
        assert_eq!(err.code(), "ConflictingDeployment");
    }

    #[test]
    fn test_pair_kind_classification() {
        let d1 = deployment("github.com/example/one", "c1", Version::new(1, 0, 0));
        let d2 = deployment("github.com/example/one", "c1", Version::new(2, 0, 0));

        let added = DeployablePair::new(None, Some(Deployable::new(d1.clone())));
        assert_eq!(added.kind(), PairKind::Added);

        let removed = DeployablePair::new(Some(Deployable::new(d1.clone())), None);
        assert_eq!(removed.kind(), PairKind::Removed);

        let same = DeployablePair::new(
            Some(Deployable::new(d1.clone())),
            Some(Deployable::new(d1.clone())),
        );
        assert_eq!(same.kind(), PairKind::Same);

        let modified = DeployablePair::new(
            Some(Deployable::new(d1)),
            Some(Deployable::new(d2)),
        );
        assert_eq!(modified.kind(), PairKind::Modified);
    }

    #[test]
    fn test_artifact_advisories_filtered_by_kind() {
        let art = BuildArtifact {
            name: "registry.example.com/one@sha256:abc".to_string(),
            kind: "docker".to_string(),
            qualities: vec![
                Quality::advisory("ephemeral_tag"),
                Quality {
                    name: "scanned".to_string(),
                    kind: "info".to_string(),
                },
            ],
        };
        let advisories: Vec<_> = art.advisories().collect();
        assert_eq!(advisories, vec!["ephemeral_tag"]);
    }

    #[test]
    fn test_r11n_id_unique() {
        assert_ne!(R11nId::generate(), R11nId::generate());
    }

    #[test]
    fn test_deployment_display_is_stable() {
        let d = deployment("github.com/example/one", "c1", Version::new(1, 0, 0));
        assert_eq!(d.to_string(), d.to_string());
        assert!(d.to_string().contains("c1:github.com/example/one"));
    }
}
