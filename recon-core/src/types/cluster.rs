//! Cluster definitions
//!
//! Clusters are the targets deployments land on. The registry of known
//! clusters travels with the state as `Defs`; deployments reference clusters
//! by name and are materialised against this registry, never by holding a
//! back-reference into it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};
use crate::types::ManifestId;

/// A deployment target cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cluster {
    /// Logical cluster name, the key used by manifests
    pub name: String,
    /// Orchestrator kind driving this cluster, e.g. `singularity`
    #[serde(default)]
    pub kind: String,
    /// Base URL of the cluster's orchestrator API
    pub base_url: String,
    /// Environment defaults applied to deployments that leave a key unset
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Advisory image qualities this cluster tolerates
    #[serde(default)]
    pub allowed_advisories: Vec<String>,
}

impl Cluster {
    /// Create a cluster with a name and base URL
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Add an environment default
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Allow an advisory quality
    pub fn with_allowed_advisory(mut self, advisory: impl Into<String>) -> Self {
        self.allowed_advisories.push(advisory.into());
        self
    }

    /// True when the named advisory is allow-listed for this cluster
    pub fn allows_advisory(&self, advisory: &str) -> bool {
        self.allowed_advisories.iter().any(|a| a == advisory)
    }
}

/// The registry of cluster definitions shared by a state snapshot.
///
/// Entries may be explicitly null (an operator typo in the defs file); the
/// distinction between absent and null is preserved so the two failure
/// modes report differently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defs {
    /// Cluster name to definition
    #[serde(default)]
    pub clusters: BTreeMap<String, Option<Cluster>>,
}

impl Defs {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cluster under its own name
    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.clusters.insert(cluster.name.clone(), Some(cluster));
        self
    }

    /// True when a (possibly null) entry exists for the name
    pub fn contains(&self, name: &str) -> bool {
        self.clusters.contains_key(name)
    }

    /// Resolve a cluster for a manifest, reporting absent and null entries.
    pub fn cluster_for(&self, name: &str, manifest: &ManifestId) -> DeployResult<&Cluster> {
        match self.clusters.get(name) {
            None => Err(DeployError::ClusterUnknown {
                cluster: name.to_string(),
                manifest: manifest.clone(),
            }),
            Some(None) => Err(DeployError::ClusterNil(name.to_string())),
            Some(Some(cluster)) => Ok(cluster),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceLocation;

    fn mid() -> ManifestId {
        ManifestId::new(SourceLocation::new("github.com/example/one", ""))
    }

    #[test]
    fn test_cluster_lookup() {
        let defs = Defs::new().with_cluster(Cluster::new("cluster-1", "http://sched.example.com"));
        assert!(defs.cluster_for("cluster-1", &mid()).is_ok());
    }

    #[test]
    fn test_unknown_cluster_reports_manifest() {
        let defs = Defs::new();
        let err = defs.cluster_for("nowhere", &mid()).unwrap_err();
        assert_eq!(err.code(), "ClusterUnknown");
        assert!(err.to_string().contains("github.com/example/one"));
    }

    #[test]
    fn test_null_cluster_entry_is_distinct() {
        let mut defs = Defs::new();
        defs.clusters.insert("broken".to_string(), None);
        let err = defs.cluster_for("broken", &mid()).unwrap_err();
        assert_eq!(err.code(), "ClusterNil");
    }

    #[test]
    fn test_advisory_allow_list() {
        let cluster = Cluster::new("c", "http://x").with_allowed_advisory("ephemeral_tag");
        assert!(cluster.allows_advisory("ephemeral_tag"));
        assert!(!cluster.allows_advisory("unapproved"));
    }
}
