//! Deploy configuration
//!
//! The cluster-agnostic description of how a service runs: resources,
//! environment, instance count, volumes, arguments and startup checks.
//! Configs are compared field-wise; a nil-tolerant volume list plus a
//! validation/repair pass keeps operator-submitted manifests honest.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A finite mapping of resource name to requested amount.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(pub BTreeMap<String, String>);

/// Environment variables provisioned for each instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Env(pub BTreeMap<String, String>);

/// Opaque metadata for outside applications; validated but not interpreted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(pub BTreeMap<String, String>);

macro_rules! string_map_impl {
    ($name:ident) => {
        impl $name {
            /// Look up a value by key
            pub fn get(&self, key: &str) -> Option<&str> {
                self.0.get(key).map(String::as_str)
            }

            /// Insert a key/value pair
            pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
                self.0.insert(key.into(), value.into());
            }

            /// Number of entries
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// True when no entries are present
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Iterate entries in key order
            pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
                self.0.iter()
            }
        }

        impl FromIterator<(String, String)> for $name {
            fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
                Self(iter.into_iter().collect())
            }
        }
    };
}

string_map_impl!(Resources);
string_map_impl!(Env);
string_map_impl!(Metadata);

/// A volume mount descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Volume {
    /// Host path
    pub host: String,
    /// Container mount point
    pub container: String,
    /// Mount mode, e.g. `RO` or `RW`
    #[serde(default)]
    pub mode: String,
}

impl Volume {
    /// Create a new volume mapping
    pub fn new(host: impl Into<String>, container: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: mode.into(),
        }
    }
}

/// A list of volume mounts.
///
/// The wire format tolerates explicit nulls in the list; they are detected
/// by validation and removed by the repair pass. Equality ignores position
/// of removed entries by comparing the non-null sequences.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volumes(pub Vec<Option<Volume>>);

impl Volumes {
    /// Build from concrete volumes
    pub fn new(vols: Vec<Volume>) -> Self {
        Self(vols.into_iter().map(Some).collect())
    }

    /// Iterate the non-null volumes in order
    pub fn iter(&self) -> impl Iterator<Item = &Volume> {
        self.0.iter().flatten()
    }

    /// Number of non-null volumes
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True when no non-null volumes are present
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// True when the list contains a null entry
    pub fn has_nil(&self) -> bool {
        self.0.iter().any(Option::is_none)
    }

    /// Remove null entries in place
    pub fn repair(&mut self) {
        self.0.retain(Option::is_some);
    }
}

impl PartialEq for Volumes {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for Volumes {}

/// Startup health-check configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Startup {
    /// Skip readiness checking entirely
    #[serde(default)]
    pub skip_check: bool,
    /// Protocol for the readiness probe, e.g. `HTTP` or `HTTPS`
    #[serde(default)]
    pub check_ready_protocol: String,
    /// URI path probed for readiness
    #[serde(default)]
    pub check_ready_uri_path: String,
    /// Seconds to wait before the first probe
    #[serde(default)]
    pub connect_delay: u32,
    /// Seconds before an unanswered probe counts as failed
    #[serde(default)]
    pub timeout: u32,
    /// Seconds between probes
    #[serde(default)]
    pub check_ready_interval: u32,
    /// Number of probes before giving up
    #[serde(default)]
    pub check_ready_retries: u32,
    /// HTTP statuses treated as failure rather than retry
    #[serde(default)]
    pub check_ready_failure_statuses: Vec<i32>,
}

/// Structural problems found in a deploy config.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigFlaw {
    /// The volume list contains a null entry; repairable
    NilVolume,
    /// A map field carries an empty key
    EmptyKey { field: &'static str },
    /// A map field carries an empty value
    EmptyValue { field: &'static str, key: String },
}

impl fmt::Display for ConfigFlaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFlaw::NilVolume => write!(f, "volume list contains a null entry"),
            ConfigFlaw::EmptyKey { field } => write!(f, "{field} contains an empty key"),
            ConfigFlaw::EmptyValue { field, key } => {
                write!(f, "{field} key {key:?} has an empty value")
            }
        }
    }
}

fn validate_string_map(map: &BTreeMap<String, String>, field: &'static str) -> Vec<ConfigFlaw> {
    let mut flaws = Vec::new();
    for (k, v) in map {
        if k.is_empty() {
            flaws.push(ConfigFlaw::EmptyKey { field });
        }
        if v.is_empty() {
            flaws.push(ConfigFlaw::EmptyValue {
                field,
                key: k.clone(),
            });
        }
    }
    flaws
}

/// The configuration of a deployment's tasks in a specific cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Resources each instance is given by the execution environment
    #[serde(default)]
    pub resources: Resources,
    /// Opaque metadata for outside applications
    #[serde(default)]
    pub metadata: Metadata,
    /// Environment variables for each instance
    #[serde(default)]
    pub env: Env,
    /// Command arguments, in order
    #[serde(default)]
    pub args: Vec<String>,
    /// Desired instance count; zero lets the controller decide
    #[serde(default)]
    pub num_instances: i32,
    /// Volume mappings
    #[serde(default)]
    pub volumes: Volumes,
    /// Startup health-check configuration
    #[serde(default)]
    pub startup: Startup,
}

impl DeployConfig {
    /// Detect structural flaws without modifying the config.
    pub fn validate(&self) -> Vec<ConfigFlaw> {
        let mut flaws = Vec::new();
        if self.volumes.has_nil() {
            flaws.push(ConfigFlaw::NilVolume);
        }
        flaws.extend(validate_string_map(&self.resources.0, "resources"));
        flaws.extend(validate_string_map(&self.env.0, "env"));
        flaws.extend(validate_string_map(&self.metadata.0, "metadata"));
        flaws
    }

    /// Run the repair pass, then report the flaws that remain.
    ///
    /// Null volume entries are removed; empty keys and values cannot be
    /// repaired and are returned to the caller.
    pub fn repair(&mut self) -> Vec<ConfigFlaw> {
        self.volumes.repair();
        self.validate()
    }

    /// True when the two configs are structurally equal.
    pub fn equal(&self, other: &DeployConfig) -> bool {
        self.diff(other).is_empty()
    }

    /// List human-readable variances between this config and another.
    ///
    /// Empty and missing maps compare equal; lists compare in order.
    pub fn diff(&self, other: &DeployConfig) -> Vec<String> {
        let mut diffs = Vec::new();
        if self.num_instances != other.num_instances {
            diffs.push(format!(
                "number of instances; this: {}; other: {}",
                self.num_instances, other.num_instances
            ));
        }
        if self.env != other.env {
            diffs.push(format!("env; this: {:?}; other: {:?}", self.env.0, other.env.0));
        }
        if self.resources != other.resources {
            diffs.push(format!(
                "resources; this: {:?}; other: {:?}",
                self.resources.0, other.resources.0
            ));
        }
        if self.metadata != other.metadata {
            diffs.push(format!(
                "metadata; this: {:?}; other: {:?}",
                self.metadata.0, other.metadata.0
            ));
        }
        if self.volumes != other.volumes {
            diffs.push(format!(
                "volumes; this: {} entries; other: {} entries",
                self.volumes.len(),
                other.volumes.len()
            ));
        }
        if self.args != other.args {
            diffs.push(format!(
                "args; this: {:?}; other: {:?}",
                self.args, other.args
            ));
        }
        if self.startup != other.startup {
            diffs.push("startup checks differ".to_string());
        }
        diffs
    }
}

impl fmt::Display for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {:?} : {:?} {:?}",
            self.num_instances,
            self.resources.0,
            self.env.0,
            self.volumes.iter().collect::<Vec<_>>()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeployConfig {
        DeployConfig {
            resources: [("cpus".to_string(), "0.5".to_string())].into_iter().collect(),
            env: [("PORT".to_string(), "8080".to_string())].into_iter().collect(),
            num_instances: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_equal_configs_have_no_diff() {
        let a = config();
        let b = config();
        assert!(a.equal(&b));
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn test_diff_reports_instance_count() {
        let a = config();
        let mut b = config();
        b.num_instances = 5;
        let diffs = a.diff(&b);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].contains("number of instances"));
    }

    #[test]
    fn test_diff_is_symmetric_on_sameness() {
        let a = config();
        let mut b = config();
        b.env.insert("EXTRA", "1");
        assert_eq!(a.diff(&b).is_empty(), b.diff(&a).is_empty());
        assert!(a.equal(&a));
    }

    #[test]
    fn test_empty_and_missing_maps_equal() {
        let a = DeployConfig::default();
        let b = DeployConfig {
            env: Env::default(),
            ..Default::default()
        };
        assert!(a.equal(&b));
    }

    #[test]
    fn test_nil_volume_detected_and_repaired() {
        let mut dc = DeployConfig {
            volumes: Volumes(vec![
                Some(Volume::new("/var/data", "/data", "RW")),
                None,
            ]),
            ..Default::default()
        };
        assert_eq!(dc.validate(), vec![ConfigFlaw::NilVolume]);
        let remaining = dc.repair();
        assert!(remaining.is_empty());
        assert_eq!(dc.volumes.len(), 1);
        assert!(!dc.volumes.has_nil());
    }

    #[test]
    fn test_empty_resource_key_is_not_repairable() {
        let mut dc = DeployConfig::default();
        dc.resources.insert("", "1");
        let remaining = dc.repair();
        assert_eq!(remaining, vec![ConfigFlaw::EmptyKey { field: "resources" }]);
    }

    #[test]
    fn test_volumes_equality_ignores_nil_entries() {
        let a = Volumes(vec![Some(Volume::new("/h", "/c", "RO")), None]);
        let b = Volumes(vec![Some(Volume::new("/h", "/c", "RO"))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_args_compared_in_order() {
        let mut a = config();
        let mut b = config();
        a.args = vec!["serve".into(), "--verbose".into()];
        b.args = vec!["--verbose".into(), "serve".into()];
        assert!(!a.equal(&b));
    }
}
