//! The resolver: one reconciliation cycle
//!
//! `Resolver::begin` snapshots actual state from the deployer, diffs it
//! against the intended set, and streams the pairs through the standard
//! pipeline: name resolution, logging, executor handoff. The returned
//! `ResolveRecorder` exposes a live status snapshot while the cycle runs
//! and the final outcome when it completes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinSet;

use recon_core::logging::operations;
use recon_core::{
    diff_deployments, Defs, DeploymentId, Deployments, DiffResolution, PairKind, Rectification,
    ResolutionType,
};

use crate::deployer::Deployer;
use crate::error::{EngineError, EngineResult};
use crate::name_resolver::NameResolver;
use crate::pipeline::{DeployableChans, LoggingProcessor};
use crate::queue_set::R11nQueueSet;
use crate::registry::Registry;

/// Where a cycle stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePhase {
    /// Fetching intent from the state store
    Reading,
    /// Diffing and dispatching pairs
    Resolving,
    /// Folding results into the published status
    Publishing,
    /// Finished; the status is final
    Complete,
}

/// Status snapshot of a resolution cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolveStatus {
    /// Current phase
    pub phase: ResolvePhase,
    /// When the cycle started
    pub started_at: DateTime<Utc>,
    /// When the cycle finished, once complete
    pub finished_at: Option<DateTime<Utc>>,
    /// The deployment ids the cycle set out to reconcile
    pub intended: Vec<DeploymentId>,
    /// Resolutions recorded so far, in completion order
    pub log: Vec<DiffResolution>,
    /// Cycle-wide errors; per-pair failures go in `log` instead
    pub errs: Vec<String>,
}

impl ResolveStatus {
    /// A fresh status in the given phase
    pub fn new(phase: ResolvePhase) -> Self {
        Self {
            phase,
            started_at: Utc::now(),
            finished_at: None,
            intended: Vec::new(),
            log: Vec::new(),
            errs: Vec::new(),
        }
    }
}

/// Records the progress and outcome of one resolution cycle.
pub struct ResolveRecorder {
    status: Arc<RwLock<ResolveStatus>>,
    done: Option<oneshot::Receiver<EngineResult<()>>>,
}

impl ResolveRecorder {
    /// The shared status cell, readable while the cycle runs
    pub fn status_cell(&self) -> Arc<RwLock<ResolveStatus>> {
        self.status.clone()
    }

    /// Snapshot the current status
    pub async fn current_status(&self) -> ResolveStatus {
        self.status.read().await.clone()
    }

    /// Block until the cycle completes.
    ///
    /// Per-pair failures do not fail the cycle; only cycle-wide errors do.
    pub async fn wait(&mut self) -> EngineResult<()> {
        match self.done.take() {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(EngineError::CycleFailed("cycle task dropped".into()))),
            None => Ok(()),
        }
    }
}

/// Runs resolution cycles against a fixed set of collaborators.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<dyn Registry>,
    deployer: Arc<dyn Deployer>,
    queues: Arc<R11nQueueSet>,
}

impl Resolver {
    /// Create a resolver
    pub fn new(
        registry: Arc<dyn Registry>,
        deployer: Arc<dyn Deployer>,
        queues: Arc<R11nQueueSet>,
    ) -> Self {
        Self {
            registry,
            deployer,
            queues,
        }
    }

    /// Start one resolution cycle over the intended deployments.
    ///
    /// The actual set is snapshotted once at the start; classification
    /// works on consistent snapshots for the whole cycle.
    pub fn begin(&self, intended: Deployments, defs: Defs) -> ResolveRecorder {
        let mut status = ResolveStatus::new(ResolvePhase::Resolving);
        status.intended = intended.keys().cloned().collect();
        let status = Arc::new(RwLock::new(status));
        let (done_tx, done_rx) = oneshot::channel();

        let cycle = CycleTask {
            registry: self.registry.clone(),
            deployer: self.deployer.clone(),
            queues: self.queues.clone(),
            status: status.clone(),
        };
        tokio::spawn(async move {
            let outcome = cycle.run(intended, defs).await;
            let _ = done_tx.send(outcome);
        });

        ResolveRecorder {
            status,
            done: Some(done_rx),
        }
    }
}

struct CycleTask {
    registry: Arc<dyn Registry>,
    deployer: Arc<dyn Deployer>,
    queues: Arc<R11nQueueSet>,
    status: Arc<RwLock<ResolveStatus>>,
}

impl CycleTask {
    async fn run(self, intended: Deployments, defs: Defs) -> EngineResult<()> {
        tracing::info!(
            operation = operations::RESOLVE_BEGIN,
            intended = intended.len(),
            "beginning resolution cycle"
        );

        let actual = match self.deployer.running_deployments(&defs).await {
            Ok(actual) => actual,
            Err(err) => {
                let mut status = self.status.write().await;
                status.errs.push(err.to_string());
                status.phase = ResolvePhase::Complete;
                status.finished_at = Some(Utc::now());
                return Err(EngineError::CycleFailed(err.to_string()));
            }
        };

        let pairs = diff_deployments(&intended, &actual);
        let chans = DeployableChans::seed(pairs)
            .pipeline(Arc::new(NameResolver::new(self.registry.clone())))
            .pipeline(Arc::new(LoggingProcessor));

        let (res_tx, mut res_rx) = mpsc::channel(16);
        tokio::spawn(handoff(chans, self.queues.clone(), res_tx));

        while let Some(resolution) = res_rx.recv().await {
            self.status.write().await.log.push(resolution);
        }

        {
            let mut status = self.status.write().await;
            status.phase = ResolvePhase::Publishing;
        }
        let logged = {
            let mut status = self.status.write().await;
            status.phase = ResolvePhase::Complete;
            status.finished_at = Some(Utc::now());
            status.log.len()
        };
        tracing::info!(
            operation = operations::RESOLVE_COMPLETE,
            resolutions = logged,
            "resolution cycle complete"
        );
        Ok(())
    }
}

/// Terminal pipeline stage: hand pairs to the queue set and collect their
/// resolutions as they complete.
///
/// Same pairs resolve immediately as unchanged. Other pairs are pushed with
/// `push_if_empty` so that repeated cycles coalesce onto an already-queued
/// action; a pair that cannot be queued reports as still converging.
/// Waiting happens on a task per action, preserving cross-key parallelism.
async fn handoff(
    mut chans: DeployableChans,
    queues: Arc<R11nQueueSet>,
    res_tx: mpsc::Sender<DiffResolution>,
) {
    let mut waiters = JoinSet::new();
    let mut pairs_open = true;
    let mut resolutions_open = true;

    while pairs_open || resolutions_open {
        tokio::select! {
            pair = chans.pairs.recv(), if pairs_open => match pair {
                Some(pair) => match pair.kind() {
                    PairKind::Same => {
                        let resolution = DiffResolution::ok(pair.id.clone(), ResolutionType::Unchanged);
                        if res_tx.send(resolution).await.is_err() {
                            return;
                        }
                    }
                    _ => {
                        let id = pair.id.clone();
                        match queues.push_if_empty(Rectification::new(pair)).await {
                            Some(queued) => {
                                let queues = queues.clone();
                                let res_tx = res_tx.clone();
                                waiters.spawn(async move {
                                    if let Some(resolution) = queues.wait(&queued.id).await {
                                        let _ = res_tx.send(resolution).await;
                                    }
                                });
                            }
                            None => {
                                tracing::debug!(deployment_id = %id, "action already queued");
                                let resolution = DiffResolution::ok(id, ResolutionType::Coming);
                                if res_tx.send(resolution).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                },
                None => pairs_open = false,
            },
            resolution = chans.resolutions.recv(), if resolutions_open => match resolution {
                Some(resolution) => {
                    if res_tx.send(resolution).await.is_err() {
                        return;
                    }
                }
                None => resolutions_open = false,
            },
        }
    }

    while waiters.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use recon_core::{
        BuildArtifact, Cluster, DeployablePair, Deployment, ErrorWrapper, Quality, SourceId,
        SourceLocation,
    };
    use semver::Version;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::queue_set::QueueSetConfig;

    fn deployment(repo: &str, version: Version, cluster: Cluster) -> Deployment {
        Deployment {
            cluster_name: cluster.name.clone(),
            cluster,
            source_id: SourceLocation::new(repo, "").source_id(version),
            deploy_config: recon_core::DeployConfig {
                num_instances: 1,
                ..Default::default()
            },
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

    struct CountingRegistry {
        calls: AtomicUsize,
        advisory: Option<String>,
    }

    #[async_trait]
    impl Registry for CountingRegistry {
        async fn get_artifact(&self, source_id: &SourceId) -> EngineResult<BuildArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let qualities = match &self.advisory {
                Some(name) => vec![Quality::advisory(name.clone())],
                None => Vec::new(),
            };
            Ok(BuildArtifact {
                name: format!("registry.example.com/{}", source_id.location.repo),
                kind: "docker".to_string(),
                qualities,
            })
        }
    }

    struct SnapshotDeployer {
        actual: Deployments,
    }

    #[async_trait]
    impl Deployer for SnapshotDeployer {
        async fn running_deployments(&self, _defs: &Defs) -> EngineResult<Deployments> {
            Ok(self.actual.clone())
        }

        async fn rectify(&self, pair: &DeployablePair) -> DiffResolution {
            let desc = match pair.kind() {
                PairKind::Added => ResolutionType::Created,
                PairKind::Removed => ResolutionType::Deleted,
                PairKind::Modified => ResolutionType::Updated,
                PairKind::Same => ResolutionType::Unchanged,
            };
            DiffResolution::ok(pair.id.clone(), desc)
        }
    }

    struct FailingDeployer;

    #[async_trait]
    impl Deployer for FailingDeployer {
        async fn running_deployments(&self, _defs: &Defs) -> EngineResult<Deployments> {
            Err(EngineError::OrchestratorUnavailable("unreachable".into()))
        }

        async fn rectify(&self, pair: &DeployablePair) -> DiffResolution {
            DiffResolution::errored(
                pair.id.clone(),
                ResolutionType::Errored,
                ErrorWrapper::new("Unexpected", "should not run"),
            )
        }
    }

    fn resolver(
        registry: Arc<dyn Registry>,
        deployer: Arc<dyn Deployer>,
    ) -> (Resolver, Arc<R11nQueueSet>) {
        let queues = Arc::new(R11nQueueSet::new(deployer.clone(), QueueSetConfig::default()));
        (Resolver::new(registry, deployer, queues.clone()), queues)
    }

    #[tokio::test]
    async fn test_cycle_with_all_four_kinds() {
        let cluster = Cluster::new("c1", "http://c1.example.com");
        let intended = set(vec![
            deployment("github.com/example/a", Version::new(1, 0, 0), cluster.clone()),
            deployment("github.com/example/b", Version::new(2, 0, 0), cluster.clone()),
            deployment("github.com/example/c", Version::new(3, 0, 0), cluster.clone()),
        ]);
        let actual = set(vec![
            deployment("github.com/example/b", Version::new(1, 0, 0), cluster.clone()),
            deployment("github.com/example/c", Version::new(3, 0, 0), cluster.clone()),
            deployment("github.com/example/d", Version::new(4, 0, 0), cluster.clone()),
        ]);

        let registry = Arc::new(CountingRegistry {
            calls: AtomicUsize::new(0),
            advisory: None,
        });
        let deployer = Arc::new(SnapshotDeployer { actual });
        let (resolver, _queues) = resolver(registry.clone(), deployer);

        let mut recorder = resolver.begin(intended, Defs::new());
        recorder.wait().await.unwrap();
        let status = recorder.current_status().await;

        assert_eq!(status.phase, ResolvePhase::Complete);
        assert_eq!(status.log.len(), 4);
        // Name resolution only runs for the Added and Modified pairs.
        assert_eq!(registry.calls.load(Ordering::SeqCst), 2);

        let descs: std::collections::BTreeMap<String, ResolutionType> = status
            .log
            .iter()
            .map(|r| (r.id.manifest_id.source.repo.clone(), r.desc))
            .collect();
        assert_eq!(descs["github.com/example/a"], ResolutionType::Created);
        assert_eq!(descs["github.com/example/b"], ResolutionType::Updated);
        assert_eq!(descs["github.com/example/c"], ResolutionType::Unchanged);
        assert_eq!(descs["github.com/example/d"], ResolutionType::Deleted);
    }

    #[tokio::test]
    async fn test_advisory_rejection_recorded_and_cycle_continues() {
        let cluster =
            Cluster::new("c1", "http://c1.example.com").with_allowed_advisory("ephemeral_tag");
        let intended = set(vec![
            deployment("github.com/example/a", Version::new(1, 0, 0), cluster.clone()),
            deployment("github.com/example/b", Version::new(2, 0, 0), cluster.clone()),
        ]);

        let registry = Arc::new(CountingRegistry {
            calls: AtomicUsize::new(0),
            advisory: Some("unapproved".to_string()),
        });
        let deployer = Arc::new(SnapshotDeployer {
            actual: Deployments::new(),
        });
        let (resolver, _queues) = resolver(registry, deployer);

        let mut recorder = resolver.begin(intended, Defs::new());
        recorder.wait().await.unwrap();
        let status = recorder.current_status().await;

        // Both pairs were dropped by the advisory gate, but the cycle
        // finished and recorded the rejections.
        assert_eq!(status.phase, ResolvePhase::Complete);
        assert_eq!(status.log.len(), 2);
        assert!(status
            .log
            .iter()
            .all(|r| r.error.as_ref().unwrap().kind == "UnacceptableAdvisory"));
        assert!(status.errs.is_empty());
    }

    #[tokio::test]
    async fn test_orchestrator_failure_fails_cycle() {
        let registry = Arc::new(CountingRegistry {
            calls: AtomicUsize::new(0),
            advisory: None,
        });
        let (resolver, _queues) = resolver(registry, Arc::new(FailingDeployer));

        let mut recorder = resolver.begin(Deployments::new(), Defs::new());
        let err = recorder.wait().await.unwrap_err();
        assert_eq!(err.code(), "CycleFailed");

        let status = recorder.current_status().await;
        assert_eq!(status.phase, ResolvePhase::Complete);
        assert_eq!(status.errs.len(), 1);
    }

    #[tokio::test]
    async fn test_live_status_reports_intended_ids() {
        let cluster = Cluster::new("c1", "http://c1.example.com");
        let intended = set(vec![deployment(
            "github.com/example/a",
            Version::new(1, 0, 0),
            cluster,
        )]);
        let registry = Arc::new(CountingRegistry {
            calls: AtomicUsize::new(0),
            advisory: None,
        });
        let deployer = Arc::new(SnapshotDeployer {
            actual: Deployments::new(),
        });
        let (resolver, _queues) = resolver(registry, deployer);

        let mut recorder = resolver.begin(intended, Defs::new());
        let live = recorder.current_status().await;
        assert_eq!(live.intended.len(), 1);
        recorder.wait().await.unwrap();
    }
}
