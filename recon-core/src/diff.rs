//! The differ: intended vs actual deployment sets
//!
//! Pair classification walks the ordered union of deployment ids from both
//! sets and emits one `DeployablePair` per id. The sets are snapshots taken
//! at the start of a resolution cycle; classification never re-reads them.

use crate::types::{Deployable, DeployablePair, Deployments, DeployStatus};

/// Compute pairwise differences between the intended and actual sets.
///
/// Ids present only on the intended side classify as Added, only on the
/// actual side as Removed, and on both sides as Same or Modified according
/// to structural equality of the deployments.
pub fn diff_deployments(intended: &Deployments, actual: &Deployments) -> Vec<DeployablePair> {
    let mut ids: Vec<_> = intended.keys().chain(actual.keys()).collect();
    ids.sort();
    ids.dedup();

    ids.into_iter()
        .map(|id| {
            let prior = actual.get(id).map(|d| Deployable {
                status: DeployStatus::Active,
                deployment: d.clone(),
                artifact: None,
            });
            let post = intended.get(id).map(|d| Deployable::new(d.clone()));
            DeployablePair::new(prior, post)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cluster, Deployment, PairKind, SourceLocation};
    use semver::Version;
    use std::collections::BTreeMap;

    fn deployment(repo: &str, version: Version) -> Deployment {
        Deployment {
            cluster_name: "cluster-1".to_string(),
            cluster: Cluster::new("cluster-1", "http://one.example.com"),
            source_id: SourceLocation::new(repo, "").source_id(version),
            ..Default::default()
        }
    }

    fn set(ds: Vec<Deployment>) -> Deployments {
        let mut out = Deployments::new();
        for d in ds {
            out.add(d).unwrap();
        }
        out
    }

    #[test]
    fn test_four_kind_classification() {
        let intended = set(vec![
            deployment("github.com/example/a", Version::new(1, 0, 0)),
            deployment("github.com/example/b", Version::new(2, 0, 0)),
            deployment("github.com/example/c", Version::new(3, 0, 0)),
        ]);
        let actual = set(vec![
            deployment("github.com/example/b", Version::new(1, 0, 0)),
            deployment("github.com/example/c", Version::new(3, 0, 0)),
            deployment("github.com/example/d", Version::new(4, 0, 0)),
        ]);

        let pairs = diff_deployments(&intended, &actual);
        let kinds: BTreeMap<String, PairKind> = pairs
            .iter()
            .map(|p| (p.id.manifest_id.source.repo.clone(), p.kind()))
            .collect();

        assert_eq!(kinds["github.com/example/a"], PairKind::Added);
        assert_eq!(kinds["github.com/example/b"], PairKind::Modified);
        assert_eq!(kinds["github.com/example/c"], PairKind::Same);
        assert_eq!(kinds["github.com/example/d"], PairKind::Removed);
        assert_eq!(pairs.len(), 4);
    }

    #[test]
    fn test_diff_symmetry() {
        let left = set(vec![deployment("github.com/example/a", Version::new(1, 0, 0))]);
        let right = set(vec![deployment("github.com/example/a", Version::new(1, 0, 0))]);

        let forward = diff_deployments(&left, &right);
        let backward = diff_deployments(&right, &left);
        assert_eq!(forward[0].kind() == PairKind::Same, backward[0].kind() == PairKind::Same);

        let changed = set(vec![deployment("github.com/example/a", Version::new(2, 0, 0))]);
        let forward = diff_deployments(&left, &changed);
        let backward = diff_deployments(&changed, &left);
        assert_eq!(forward[0].kind(), PairKind::Modified);
        assert_eq!(backward[0].kind(), PairKind::Modified);
    }

    #[test]
    fn test_pairs_emitted_in_id_order() {
        let intended = set(vec![
            deployment("github.com/example/z", Version::new(1, 0, 0)),
            deployment("github.com/example/a", Version::new(1, 0, 0)),
        ]);
        let pairs = diff_deployments(&intended, &Deployments::new());
        let ids: Vec<String> = pairs.iter().map(|p| p.id.to_string()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
