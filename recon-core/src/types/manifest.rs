//! Manifests
//!
//! A manifest is the operator-declared intent for one source location: which
//! clusters it deploys to and with what configuration. The reserved
//! `Global` deploy-spec key carries configuration inherited by every
//! cluster-specific spec during flattening.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};
use crate::types::{DeployConfig, ManifestId, SourceLocation};

/// Reserved deploy-spec key whose config is inherited by all clusters.
pub const GLOBAL_SPEC_KEY: &str = "Global";

/// The kind of workload a manifest describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestKind {
    /// Long-running HTTP service
    #[default]
    #[serde(rename = "http-service")]
    HttpService,
    /// Long-running background worker
    #[serde(rename = "worker")]
    Worker,
    /// Task run on a schedule
    #[serde(rename = "scheduled")]
    Scheduled,
    /// Task run on demand
    #[serde(rename = "on-demand")]
    OnDemand,
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ManifestKind::HttpService => "http-service",
            ManifestKind::Worker => "worker",
            ManifestKind::Scheduled => "scheduled",
            ManifestKind::OnDemand => "on-demand",
        };
        write!(f, "{s}")
    }
}

/// The set of owners responsible for a manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerSet(pub BTreeSet<String>);

impl OwnerSet {
    /// Add an owner
    pub fn add(&mut self, owner: impl Into<String>) {
        self.0.insert(owner.into());
    }

    /// True when no owners are recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for OwnerSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One cluster's deploy configuration within a manifest.
///
/// The effective cluster name is the key under which the spec appears in
/// `Manifest::deployments`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploySpec {
    /// Version of the source to deploy; `0.0.0` means unset
    pub version: Version,
    /// Deploy configuration
    #[serde(default)]
    pub deploy_config: DeployConfig,
}

impl DeploySpec {
    /// Create a spec at a version with a config
    pub fn new(version: Version, deploy_config: DeployConfig) -> Self {
        Self {
            version,
            deploy_config,
        }
    }

    /// True when both the version and the config carry only zero values
    pub fn is_zero(&self) -> bool {
        self.version == Version::new(0, 0, 0) && self.deploy_config == DeployConfig::default()
    }

    /// True when the two specs are structurally equal
    pub fn equal(&self, other: &DeploySpec) -> bool {
        self.diff(other).is_empty()
    }

    /// List human-readable variances between this spec and another
    pub fn diff(&self, other: &DeploySpec) -> Vec<String> {
        let mut diffs = Vec::new();
        if self.version != other.version {
            diffs.push(format!(
                "version; this: {}; other: {}",
                self.version, other.version
            ));
        }
        diffs.extend(self.deploy_config.diff(&other.deploy_config));
        diffs
    }
}

impl Default for DeploySpec {
    fn default() -> Self {
        Self {
            version: Version::new(0, 0, 0),
            deploy_config: DeployConfig::default(),
        }
    }
}

/// Operator-declared intent for one source location.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// The source location this manifest describes
    pub source: SourceLocation,
    /// Optional variant tag
    #[serde(default)]
    pub flavor: String,
    /// Owners notified about this manifest's deployments
    #[serde(default)]
    pub owners: OwnerSet,
    /// Workload kind
    #[serde(default)]
    pub kind: ManifestKind,
    /// Cluster name to deploy spec; may contain the reserved `Global` key
    #[serde(default)]
    pub deployments: BTreeMap<String, DeploySpec>,
}

impl Manifest {
    /// Create an empty manifest for a source location
    pub fn new(source: SourceLocation) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }

    /// The manifest's identity
    pub fn id(&self) -> ManifestId {
        ManifestId {
            source: self.source.clone(),
            flavor: self.flavor.clone(),
        }
    }

    /// Set the manifest's identity fields
    pub fn set_id(&mut self, id: ManifestId) {
        self.source = id.source;
        self.flavor = id.flavor;
    }
}

/// An ordered mapping of manifest id to manifest.
///
/// Serialized as a sequence of manifests; the keys are derived from the
/// values, so a duplicate id in the wire form fails deserialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifests(pub BTreeMap<ManifestId, Manifest>);

impl Serialize for Manifests {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.values())
    }
}

impl<'de> Deserialize<'de> for Manifests {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<Manifest>::deserialize(deserializer)?;
        let mut ms = Manifests::new();
        for m in list {
            ms.add(m).map_err(serde::de::Error::custom)?;
        }
        Ok(ms)
    }
}

impl Manifests {
    /// Create an empty manifest set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a manifest, rejecting duplicate ids.
    pub fn add(&mut self, manifest: Manifest) -> DeployResult<()> {
        let id = manifest.id();
        if self.0.contains_key(&id) {
            return Err(DeployError::Validation {
                field: "manifests",
                reason: format!("duplicate manifest id {id}"),
            });
        }
        self.0.insert(id, manifest);
        Ok(())
    }

    /// Insert or replace a manifest under its id
    pub fn set(&mut self, manifest: Manifest) {
        self.0.insert(manifest.id(), manifest);
    }

    /// Look up a manifest by id
    pub fn get(&self, id: &ManifestId) -> Option<&Manifest> {
        self.0.get(id)
    }

    /// Look up a manifest mutably by id
    pub fn get_mut(&mut self, id: &ManifestId) -> Option<&mut Manifest> {
        self.0.get_mut(id)
    }

    /// Iterate manifests in id order
    pub fn iter(&self) -> impl Iterator<Item = (&ManifestId, &Manifest)> {
        self.0.iter()
    }

    /// Number of manifests
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no manifests are present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        let mut m = Manifest::new(SourceLocation::new("github.com/example/one", ""));
        m.deployments.insert(
            "cluster-1".to_string(),
            DeploySpec::new(Version::new(1, 1, 1), DeployConfig::default()),
        );
        m
    }

    #[test]
    fn test_manifest_id_roundtrip() {
        let mut m = manifest();
        m.flavor = "canary".to_string();
        let id = m.id();
        let mut other = Manifest::default();
        other.set_id(id.clone());
        assert_eq!(other.id(), id);
    }

    #[test]
    fn test_duplicate_manifest_rejected() {
        let mut ms = Manifests::new();
        ms.add(manifest()).unwrap();
        let err = ms.add(manifest()).unwrap_err();
        assert_eq!(err.code(), "Validation");
    }

    #[test]
    fn test_spec_diff_includes_version() {
        let a = DeploySpec::new(Version::new(1, 1, 1), DeployConfig::default());
        let b = DeploySpec::new(Version::new(2, 0, 0), DeployConfig::default());
        let diffs = a.diff(&b);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].contains("version"));
        assert!(a.equal(&a));
    }

    #[test]
    fn test_zero_spec() {
        assert!(DeploySpec::default().is_zero());
        let non_zero = DeploySpec::new(Version::new(0, 0, 1), DeployConfig::default());
        assert!(!non_zero.is_zero());
    }

    #[test]
    fn test_manifest_kind_serialization() {
        let kind: ManifestKind = serde_json::from_str("\"http-service\"").unwrap();
        assert_eq!(kind, ManifestKind::HttpService);
        assert_eq!(serde_json::to_string(&ManifestKind::Worker).unwrap(), "\"worker\"");
    }
}
