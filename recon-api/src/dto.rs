//! Response and request bodies
//!
//! Bodies that participate in optimistic concurrency implement the
//! comparable contract: an empty receiver for decoding, a variance listing
//! for conflict detection, and header decoration for etags. The contract
//! is a closed set, so it is encoded as an enum rather than dynamic
//! dispatch.

use std::collections::BTreeMap;

use axum::http::{header, HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha512};

use recon_core::{Deployment, Deployments, DiffResolution, User};
use recon_engine::ResolveStatus;

/// Request header carrying the operating user's name.
pub const HEADER_USER_NAME: &str = "Recon-User-Name";
/// Request header carrying the operating user's email.
pub const HEADER_USER_EMAIL: &str = "Recon-User-Email";

/// Extract the operating user from request headers.
pub fn user_from_headers(headers: &HeaderMap) -> User {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    User {
        name: get(HEADER_USER_NAME),
        email: get(HEADER_USER_EMAIL),
    }
}

/// Metadata included in API response bodies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Links related to this response
    #[serde(default)]
    pub links: BTreeMap<String, String>,
    /// Error message, when the response reports a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// HTTP status code of this response
    #[serde(default)]
    pub status_code: u16,
}

/// The DTO wrapper for the expanded deployment set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GdmWrapper {
    /// All deployments, order-insignificant
    pub deployments: Vec<Deployment>,
}

impl GdmWrapper {
    /// Wrap a deployment set
    pub fn from_deployments(ds: &Deployments) -> Self {
        Self {
            deployments: ds.iter().map(|(_, d)| d.clone()).collect(),
        }
    }

    /// Rebuild the keyed set, rejecting duplicate ids.
    pub fn to_deployments(&self) -> recon_core::DeployResult<Deployments> {
        let mut ds = Deployments::new();
        for d in &self.deployments {
            ds.add(d.clone())?;
        }
        Ok(ds)
    }

    /// Etag over the canonically sorted deployment strings.
    ///
    /// Any set of deployments is equivalent regardless of order, so the
    /// deployments are sorted by id before hashing.
    pub fn etag(&self) -> String {
        let mut strings: Vec<String> = self.deployments.iter().map(|d| d.to_string()).collect();
        strings.sort();

        let mut hash = Sha512::new();
        for s in &strings {
            hash.update(s.as_bytes());
        }
        format!("w/{}", URL_SAFE.encode(hash.finalize()))
    }

    /// Add the etag header for this body
    pub fn add_headers(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.etag()) {
            headers.insert(header::ETAG, value);
        }
    }

    /// List variances from another wrapper, as an unordered set comparison.
    pub fn variances_from(&self, other: &GdmWrapper) -> Vec<String> {
        let mut variances = Vec::new();
        if self.deployments.len() != other.deployments.len() {
            variances.push("deployment list lengths differ".to_string());
            return variances;
        }
        for d in &self.deployments {
            match other.deployments.iter().find(|o| o.id() == d.id()) {
                None => variances.push(format!("no match found for {}", d.id())),
                Some(o) => variances.extend(d.diff(o)),
            }
        }
        variances
    }
}

/// The body of the single-deployment resource.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SingleDeploymentBody {
    /// Response metadata
    #[serde(default)]
    pub meta: ResponseMeta,
    /// The deployment itself
    #[serde(default)]
    pub deployment: Deployment,
}

impl SingleDeploymentBody {
    /// Etag over the deployment alone; `meta` varies independently.
    pub fn etag(&self) -> String {
        let serialized =
            serde_json::to_vec(&self.deployment).expect("deployment serializes");
        let mut hash = Sha512::new();
        hash.update(&serialized);
        format!("w/{}", URL_SAFE.encode(hash.finalize()))
    }

    /// Add the etag header, plus `Location` when a deploy action is queued
    pub fn add_headers(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.etag()) {
            headers.insert(header::ETAG, value);
        }
        if let Some(queued) = self.meta.links.get("queuedDeployAction") {
            if let Ok(value) = HeaderValue::from_str(queued) {
                headers.insert(header::LOCATION, value);
            }
        }
    }

    /// List variances from another body
    pub fn variances_from(&self, other: &SingleDeploymentBody) -> Vec<String> {
        self.deployment.diff(&other.deployment)
    }
}

/// Cluster name and orchestrator URL, for the server listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameData {
    pub cluster_name: String,
    pub url: String,
}

/// The DTO for the cluster server listing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerListData {
    pub servers: Vec<NameData>,
}

impl ServerListData {
    /// List variances from another listing, order-insensitively.
    pub fn variances_from(&self, other: &ServerListData) -> Vec<String> {
        if self.servers.len() != other.servers.len() {
            return vec!["server list lengths differ".to_string()];
        }
        self.servers
            .iter()
            .filter(|s| !other.servers.contains(s))
            .map(|s| format!("no match found for {}", s.cluster_name))
            .collect()
    }
}

/// The closed set of bodies participating in conflict detection.
pub enum ComparableBody {
    Gdm(GdmWrapper),
    SingleDeployment(SingleDeploymentBody),
    ServerList(ServerListData),
}

impl ComparableBody {
    /// An empty receiver of the same variant, for decoding a peer body
    pub fn empty_receiver(&self) -> ComparableBody {
        match self {
            ComparableBody::Gdm(_) => ComparableBody::Gdm(GdmWrapper::default()),
            ComparableBody::SingleDeployment(_) => {
                ComparableBody::SingleDeployment(SingleDeploymentBody::default())
            }
            ComparableBody::ServerList(_) => ComparableBody::ServerList(ServerListData::default()),
        }
    }

    /// Human-readable variances between two bodies.
    ///
    /// Mismatched variants are a single, total variance.
    pub fn variances_from(&self, other: &ComparableBody) -> Vec<String> {
        match (self, other) {
            (ComparableBody::Gdm(a), ComparableBody::Gdm(b)) => a.variances_from(b),
            (ComparableBody::SingleDeployment(a), ComparableBody::SingleDeployment(b)) => {
                a.variances_from(b)
            }
            (ComparableBody::ServerList(a), ComparableBody::ServerList(b)) => a.variances_from(b),
            _ => vec!["body types differ".to_string()],
        }
    }
}

/// Queue description for one deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueDesc {
    pub deployment_id: String,
    pub length: usize,
}

/// The DTO for the queue listing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeploymentQueuesResponse {
    pub queues: BTreeMap<String, QueueDesc>,
}

/// The DTO for one queued action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueItemResponse {
    /// The opaque action id
    pub action: String,
    /// `queued` or `resolved`
    pub state: String,
    /// The final resolution, once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<DiffResolution>,
}

/// The DTO for the resolve status resource.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    /// The completed previous cycle
    pub stable: Option<ResolveStatus>,
    /// The in-progress cycle, if any
    pub live: Option<ResolveStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::{Cluster, SourceLocation};
    use semver::Version;

    fn deployment(repo: &str, cluster: &str) -> Deployment {
        Deployment {
            cluster_name: cluster.to_string(),
            cluster: Cluster::new(cluster, format!("http://{cluster}.example.com")),
            source_id: SourceLocation::new(repo, "").source_id(Version::new(1, 0, 0)),
            ..Default::default()
        }
    }

    #[test]
    fn test_gdm_etag_invariant_under_reorder() {
        let a = deployment("github.com/example/a", "c1");
        let b = deployment("github.com/example/b", "c1");
        let forward = GdmWrapper {
            deployments: vec![a.clone(), b.clone()],
        };
        let backward = GdmWrapper {
            deployments: vec![b, a],
        };
        assert_eq!(forward.etag(), backward.etag());
        assert!(forward.etag().starts_with("w/"));
    }

    #[test]
    fn test_gdm_etag_changes_with_content() {
        let a = GdmWrapper {
            deployments: vec![deployment("github.com/example/a", "c1")],
        };
        let b = GdmWrapper {
            deployments: vec![deployment("github.com/example/b", "c1")],
        };
        assert_ne!(a.etag(), b.etag());
    }

    #[test]
    fn test_gdm_variances_ignore_order() {
        let a = deployment("github.com/example/a", "c1");
        let b = deployment("github.com/example/b", "c1");
        let forward = GdmWrapper {
            deployments: vec![a.clone(), b.clone()],
        };
        let backward = GdmWrapper {
            deployments: vec![b, a],
        };
        assert!(forward.variances_from(&backward).is_empty());
    }

    #[test]
    fn test_comparable_mismatched_variants() {
        let gdm = ComparableBody::Gdm(GdmWrapper::default());
        let single = ComparableBody::SingleDeployment(SingleDeploymentBody::default());
        assert_eq!(gdm.variances_from(&single), vec!["body types differ"]);
        assert!(matches!(gdm.empty_receiver(), ComparableBody::Gdm(_)));
    }

    #[test]
    fn test_single_deployment_etag_ignores_meta() {
        let mut body = SingleDeploymentBody {
            deployment: deployment("github.com/example/a", "c1"),
            ..Default::default()
        };
        let before = body.etag();
        body.meta.status_code = 201;
        body.meta
            .links
            .insert("queuedDeployAction".to_string(), "/x".to_string());
        assert_eq!(body.etag(), before);
    }

    #[test]
    fn test_user_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_USER_NAME, HeaderValue::from_static("op"));
        headers.insert(HEADER_USER_EMAIL, HeaderValue::from_static("op@example.com"));
        let user = user_from_headers(&headers);
        assert_eq!(user.name, "op");
        assert_eq!(user.email, "op@example.com");
    }
}
