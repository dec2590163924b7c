//! Flatten and gather: the manifest/deployment algebra
//!
//! Two inverse operations relate the layered manifest form to the concrete
//! per-cluster deployment form.
//!
//! *Flatten* removes a manifest's reserved `Global` spec, overlays each
//! cluster spec on it (first non-zero field wins; map fields merge with the
//! first setter winning), overlays the cluster's environment defaults for
//! keys still unset, then materialises the cluster definition onto the
//! deployment.
//!
//! *Gather* groups deployments by manifest id, strips environment entries
//! that merely repeat the cluster default, and factors the field-wise
//! common configuration back out into a `Global` spec. A field that agrees
//! across every member moves to `Global` and is zeroed on the members; a
//! field that varies stays on the members and is zeroed in `Global`.
//! Versions are folded into `Global` only when every member agrees.
//!
//! For any valid deployment set `D`: `flatten(gather(D)) == D`.

use std::collections::BTreeMap;

use semver::Version;

use crate::error::{DeployError, DeployResult};
use crate::state::State;
use crate::types::{
    Defs, DeployConfig, DeploySpec, Deployment, Deployments, Manifest, Manifests, Startup,
    GLOBAL_SPEC_KEY,
};

const ZERO_VERSION: Version = Version::new(0, 0, 0);

/// Overlay configs in priority order: the first entry wins every field it
/// sets; map fields merge key-wise with the first setter winning.
fn flatten_deploy_configs(configs: &[&DeployConfig]) -> DeployConfig {
    let mut flat = DeployConfig::default();
    if let Some(c) = configs.iter().find(|c| c.num_instances != 0) {
        flat.num_instances = c.num_instances;
    }
    if let Some(c) = configs.iter().find(|c| !c.volumes.is_empty()) {
        flat.volumes = c.volumes.clone();
    }
    if let Some(c) = configs.iter().find(|c| !c.args.is_empty()) {
        flat.args = c.args.clone();
    }
    if let Some(c) = configs.iter().find(|c| c.startup != Startup::default()) {
        flat.startup = c.startup.clone();
    }
    for c in configs {
        for (k, v) in c.resources.iter() {
            flat.resources.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in c.env.iter() {
            flat.env.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in c.metadata.iter() {
            flat.metadata.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    flat
}

/// Factor the common configuration out of a group of configs.
///
/// Returns the common (`global`) config and the pruned members in input
/// order. Each field lives in exactly one place afterwards.
fn gather_deploy_configs(configs: &[DeployConfig]) -> (DeployConfig, Vec<DeployConfig>) {
    let first = &configs[0];
    let ni_vary = configs.iter().any(|c| c.num_instances != first.num_instances);
    let vols_vary = configs.iter().any(|c| c.volumes != first.volumes);
    let args_vary = configs.iter().any(|c| c.args != first.args);
    let rez_vary = configs.iter().any(|c| c.resources != first.resources);
    let env_vary = configs.iter().any(|c| c.env != first.env);
    let meta_vary = configs.iter().any(|c| c.metadata != first.metadata);
    let startup_vary = configs.iter().any(|c| c.startup != first.startup);

    let mut global = first.clone();
    if ni_vary {
        global.num_instances = 0;
    }
    if vols_vary {
        global.volumes = Default::default();
    }
    if args_vary {
        global.args = Vec::new();
    }
    if rez_vary {
        global.resources = Default::default();
    }
    if env_vary {
        global.env = Default::default();
    }
    if meta_vary {
        global.metadata = Default::default();
    }
    if startup_vary {
        global.startup = Startup::default();
    }

    let pruned = configs
        .iter()
        .map(|c| {
            let mut p = c.clone();
            if !ni_vary {
                p.num_instances = 0;
            }
            if !vols_vary {
                p.volumes = Default::default();
            }
            if !args_vary {
                p.args = Vec::new();
            }
            if !rez_vary {
                p.resources = Default::default();
            }
            if !env_vary {
                p.env = Default::default();
            }
            if !meta_vary {
                p.metadata = Default::default();
            }
            if !startup_vary {
                p.startup = Startup::default();
            }
            p
        })
        .collect();

    (global, pruned)
}

/// Overlay deploy specs in priority order.
fn flatten_deploy_specs(specs: &[&DeploySpec]) -> DeploySpec {
    let configs: Vec<&DeployConfig> = specs.iter().map(|s| &s.deploy_config).collect();
    let version = specs
        .iter()
        .map(|s| &s.version)
        .find(|v| **v != ZERO_VERSION)
        .cloned()
        .unwrap_or(ZERO_VERSION);
    DeploySpec {
        version,
        deploy_config: flatten_deploy_configs(&configs),
    }
}

/// Factor the common spec out of a manifest's per-cluster specs.
///
/// The version moves to `Global` only when every member carries the same
/// version.
fn gather_deploy_specs(
    specs: &BTreeMap<String, DeploySpec>,
) -> (DeploySpec, BTreeMap<String, DeploySpec>) {
    let names: Vec<&String> = specs.keys().collect();
    let members: Vec<&DeploySpec> = specs.values().collect();
    let configs: Vec<DeployConfig> = members.iter().map(|s| s.deploy_config.clone()).collect();
    let (global_config, pruned_configs) = gather_deploy_configs(&configs);

    let gather_version = members.iter().all(|s| s.version == members[0].version);

    let global = DeploySpec {
        version: if gather_version {
            members[0].version.clone()
        } else {
            ZERO_VERSION
        },
        deploy_config: global_config,
    };

    let pruned = names
        .into_iter()
        .zip(members.iter().zip(pruned_configs))
        .map(|(name, (member, config))| {
            let version = if gather_version {
                ZERO_VERSION
            } else {
                member.version.clone()
            };
            (
                name.clone(),
                DeploySpec {
                    version,
                    deploy_config: config,
                },
            )
        })
        .collect();

    (global, pruned)
}

impl State {
    /// Flatten every manifest into the concrete deployment set.
    ///
    /// Fails with `ClusterUnknown` when a spec names an undefined cluster,
    /// `ClusterNil` when the registry entry is null, and
    /// `ConflictingDeployment` when two manifests collide on an id.
    pub fn deployments(&self) -> DeployResult<Deployments> {
        let mut ds = Deployments::new();
        for (_, manifest) in self.manifests.iter() {
            ds.add_all(self.deployments_from_manifest(manifest)?)?;
        }
        Ok(ds)
    }

    /// Flatten a single manifest against this state's cluster definitions.
    pub fn deployments_from_manifest(&self, manifest: &Manifest) -> DeployResult<Deployments> {
        let mut ds = Deployments::new();
        let mid = manifest.id();

        let global = manifest.deployments.get(GLOBAL_SPEC_KEY);

        for (cluster_name, spec) in &manifest.deployments {
            if cluster_name == GLOBAL_SPEC_KEY {
                continue;
            }
            let cluster = self.defs.cluster_for(cluster_name, &mid)?;

            let mut layers = vec![spec];
            layers.extend(global);
            let flat = flatten_deploy_specs(&layers);

            let mut deploy_config = flat.deploy_config;
            for (k, v) in &cluster.env {
                deploy_config
                    .env
                    .0
                    .entry(k.clone())
                    .or_insert_with(|| v.clone());
            }

            ds.add(Deployment {
                cluster_name: cluster_name.clone(),
                cluster: cluster.clone(),
                deploy_config,
                source_id: manifest.source.source_id(flat.version),
                flavor: manifest.flavor.clone(),
                owners: manifest.owners.clone(),
                kind: manifest.kind,
            })?;
        }
        Ok(ds)
    }

    /// Apply deployment-level updates and regenerate the manifest set.
    pub fn update_deployments(&mut self, updates: Vec<Deployment>) -> DeployResult<()> {
        let mut ds = self.deployments()?;
        for d in updates {
            ds.set(d);
        }
        self.manifests = ds.manifests(&self.defs)?;
        Ok(())
    }
}

impl Deployments {
    /// Gather the deployment set back into manifests.
    pub fn manifests(&self, defs: &Defs) -> DeployResult<Manifests> {
        let mut ms = Manifests::new();

        for (_, d) in self.iter() {
            if d.cluster_name.is_empty() {
                return Err(DeployError::Validation {
                    field: "deployment",
                    reason: format!("deployment {} has no cluster name", d.source_id),
                });
            }
            let mid = d.manifest_id();
            let cluster = defs.cluster_for(&d.cluster_name, &mid)?;

            let mut spec = DeploySpec {
                version: d.source_id.version.clone(),
                deploy_config: d.deploy_config.clone(),
            };
            // Entries that just repeat the cluster default are implied.
            spec.deploy_config
                .env
                .0
                .retain(|k, v| cluster.env.get(k) != Some(v));

            let manifest = match ms.get_mut(&mid) {
                Some(m) => m,
                None => {
                    let mut m = Manifest::new(d.source_id.location.clone());
                    m.flavor = d.flavor.clone();
                    m.owners = d.owners.clone();
                    ms.set(m);
                    ms.get_mut(&mid).expect("manifest just inserted")
                }
            };
            manifest.kind = d.kind;
            manifest.deployments.insert(d.cluster_name.clone(), spec);
        }

        for (_, manifest) in ms.0.iter_mut() {
            if manifest.deployments.is_empty() {
                continue;
            }
            let (global, pruned) = gather_deploy_specs(&manifest.deployments);
            if global.is_zero() {
                continue;
            }
            manifest.deployments = pruned;
            manifest
                .deployments
                .insert(GLOBAL_SPEC_KEY.to_string(), global);
        }

        Ok(ms)
    }
}
