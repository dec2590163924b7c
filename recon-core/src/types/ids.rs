//! Typed identifiers
//!
//! Every entity in the deployment model is addressed by a structured
//! identifier with a canonical string form. The string forms are what the
//! HTTP surface, the etag computation and the logs agree on, so parsing and
//! printing must round-trip exactly.

use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// A location of a project within a source repository.
///
/// Equality considers both the repository URL and the offset directory; two
/// projects in the same repository are distinct locations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Repository URL, e.g. `github.com/example/service`
    pub repo: String,
    /// Offset directory within the repository; empty for the root
    #[serde(default)]
    pub dir: String,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(repo: impl Into<String>, dir: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            dir: dir.into(),
        }
    }

    /// Attach a version, producing a SourceId
    pub fn source_id(&self, version: Version) -> SourceId {
        SourceId {
            location: self.clone(),
            version,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dir.is_empty() {
            write!(f, "{}", self.repo)
        } else {
            write!(f, "{},{}", self.repo, self.dir)
        }
    }
}

impl FromStr for SourceLocation {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DeployError::InvalidIdentifier {
                kind: "source location",
                value: s.to_string(),
            });
        }
        let mut parts = s.splitn(2, ',');
        let repo = parts.next().unwrap_or_default().to_string();
        let dir = parts.next().unwrap_or_default().to_string();
        Ok(Self { repo, dir })
    }
}

/// A versioned source location: the identity of a build input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId {
    /// Where the source lives
    pub location: SourceLocation,
    /// Semantic version of the source
    pub version: Version,
}

impl SourceId {
    /// Create a new source id
    pub fn new(location: SourceLocation, version: Version) -> Self {
        Self { location, version }
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self {
            location: SourceLocation::default(),
            version: Version::new(0, 0, 0),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.location, self.version)
    }
}

/// The identity of a manifest: a source location plus an optional flavor.
///
/// Flavors distinguish multiple manifests rooted at the same location, e.g.
/// a service deployed once per supported region variant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestId {
    /// The source location the manifest describes
    pub source: SourceLocation,
    /// Optional variant tag; empty for the default flavor
    #[serde(default)]
    pub flavor: String,
}

impl ManifestId {
    /// Create a manifest id with the default (empty) flavor
    pub fn new(source: SourceLocation) -> Self {
        Self {
            source,
            flavor: String::new(),
        }
    }

    /// Create a manifest id with an explicit flavor
    pub fn with_flavor(source: SourceLocation, flavor: impl Into<String>) -> Self {
        Self {
            source,
            flavor: flavor.into(),
        }
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flavor.is_empty() {
            write!(f, "{}", self.source)
        } else {
            write!(f, "{}~{}", self.source, self.flavor)
        }
    }
}

impl FromStr for ManifestId {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '~');
        let source = parts.next().unwrap_or_default().parse()?;
        let flavor = parts.next().unwrap_or_default().to_string();
        Ok(Self { source, flavor })
    }
}

impl PartialOrd for ManifestId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ManifestId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

/// The canonical identity key of the system: one manifest deployed to one
/// cluster. Ordered by string form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId {
    /// The manifest this deployment realises
    pub manifest_id: ManifestId,
    /// The logical cluster name
    pub cluster: String,
}

impl DeploymentId {
    /// Create a new deployment id
    pub fn new(manifest_id: ManifestId, cluster: impl Into<String>) -> Self {
        Self {
            manifest_id,
            cluster: cluster.into(),
        }
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cluster, self.manifest_id)
    }
}

impl FromStr for DeploymentId {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ':');
        let cluster = parts.next().unwrap_or_default().to_string();
        let manifest = parts.next().ok_or_else(|| DeployError::InvalidIdentifier {
            kind: "deployment id",
            value: s.to_string(),
        })?;
        Ok(Self {
            manifest_id: manifest.parse()?,
            cluster,
        })
    }
}

impl PartialOrd for DeploymentId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeploymentId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location_display_roundtrip() {
        let loc = SourceLocation::new("github.com/example/one", "services/api");
        let parsed: SourceLocation = loc.to_string().parse().unwrap();
        assert_eq!(loc, parsed);

        let bare = SourceLocation::new("github.com/example/one", "");
        assert_eq!(bare.to_string(), "github.com/example/one");
        let parsed: SourceLocation = bare.to_string().parse().unwrap();
        assert_eq!(bare, parsed);
    }

    #[test]
    fn test_source_location_empty_rejected() {
        assert!("".parse::<SourceLocation>().is_err());
    }

    #[test]
    fn test_manifest_id_flavor_roundtrip() {
        let mid = ManifestId::with_flavor(
            SourceLocation::new("github.com/example/one", ""),
            "canary",
        );
        assert_eq!(mid.to_string(), "github.com/example/one~canary");
        let parsed: ManifestId = mid.to_string().parse().unwrap();
        assert_eq!(mid, parsed);
    }

    #[test]
    fn test_deployment_id_roundtrip() {
        let did = DeploymentId::new(
            ManifestId::with_flavor(SourceLocation::new("github.com/example/one", "sub"), "f"),
            "cluster-1",
        );
        assert_eq!(did.to_string(), "cluster-1:github.com/example/one,sub~f");
        let parsed: DeploymentId = did.to_string().parse().unwrap();
        assert_eq!(did, parsed);
    }

    #[test]
    fn test_deployment_id_ordering_matches_string_form() {
        let a = DeploymentId::new(
            ManifestId::new(SourceLocation::new("github.com/example/b", "")),
            "alpha",
        );
        let b = DeploymentId::new(
            ManifestId::new(SourceLocation::new("github.com/example/a", "")),
            "beta",
        );
        assert_eq!(a.cmp(&b), a.to_string().cmp(&b.to_string()));
        assert!(a < b);
    }

    #[test]
    fn test_source_id_display() {
        let sid = SourceLocation::new("github.com/example/one", "")
            .source_id(Version::new(1, 2, 3));
        assert_eq!(sid.to_string(), "github.com/example/one 1.2.3");
    }
}
