//! The auto-resolver
//!
//! An infinite loop of resolution cycles. Each pass reads intent from the
//! state store, flattens it, runs one resolver cycle and publishes the
//! outcome. A cycle is triggered by the timer (a fixed delay after the
//! previous cycle completes) or by an external poke; pokes arriving while
//! a cycle runs coalesce into a single follow-up. At most one cycle runs
//! at a time by construction: the loop body is the only place cycles start.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

use recon_core::logging::operations;
use recon_core::StateReader;

use crate::resolver::{ResolvePhase, Resolver, ResolveStatus};

/// Outcome of one cycle, announced to listeners.
pub type CycleOutcome = Result<(), String>;

/// The default delay between the end of one cycle and the start of the next.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

struct StatusBoard {
    stable: Option<ResolveStatus>,
    live: Option<Arc<RwLock<ResolveStatus>>>,
}

/// Drives the resolve loop; consumed by [`AutoResolver::kickoff`].
pub struct AutoResolver {
    update_interval: Duration,
    state_reader: Arc<dyn StateReader>,
    resolver: Resolver,
}

impl AutoResolver {
    /// Create an auto-resolver with the default interval
    pub fn new(resolver: Resolver, state_reader: Arc<dyn StateReader>) -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            state_reader,
            resolver,
        }
    }

    /// Override the inter-cycle delay
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Start the loop, returning its handle.
    ///
    /// The first cycle begins immediately. An error-logging listener is
    /// subscribed to the announce channel as a standing courtesy; further
    /// listeners can subscribe through the handle.
    pub fn kickoff(self) -> AutoResolverHandle {
        let (poke_tx, mut poke_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (announce_tx, _) = broadcast::channel::<CycleOutcome>(16);
        let board = Arc::new(RwLock::new(StatusBoard {
            stable: None,
            live: None,
        }));

        let mut error_rx = announce_tx.subscribe();
        tokio::spawn(async move {
            while let Ok(outcome) = error_rx.recv().await {
                if let Err(error) = outcome {
                    tracing::warn!(error = %error, "resolution cycle failed");
                }
            }
        });

        let loop_board = board.clone();
        let loop_announce = announce_tx.clone();
        let task = tokio::spawn(async move {
            loop {
                let outcome = self.resolve_once(&loop_board).await;
                let _ = loop_announce.send(outcome);

                // Pokes that arrived mid-cycle fold into one follow-up.
                let mut poked = false;
                while poke_rx.try_recv().is_ok() {
                    poked = true;
                }
                if poked {
                    continue;
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    poke = poke_rx.recv() => {
                        if poke.is_none() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.update_interval) => {}
                }
            }
            tracing::info!("auto-resolver stopped");
        });

        AutoResolverHandle {
            poke_tx,
            shutdown_tx,
            board,
            announce: announce_tx,
            task,
        }
    }

    async fn resolve_once(&self, board: &Arc<RwLock<StatusBoard>>) -> CycleOutcome {
        {
            let mut board = board.write().await;
            board.live = Some(Arc::new(RwLock::new(ResolveStatus::new(
                ResolvePhase::Reading,
            ))));
        }

        let outcome = self.read_and_resolve(board).await;

        if let Err(error) = &outcome {
            tracing::warn!(error = %error, "cycle aborted");
            board.write().await.live = None;
        }
        outcome
    }

    async fn read_and_resolve(&self, board: &Arc<RwLock<StatusBoard>>) -> CycleOutcome {
        let state = self
            .state_reader
            .read_state()
            .await
            .map_err(|e| e.to_string())?;
        tracing::debug!(
            operation = operations::STATE_READ,
            manifests = state.manifests.len(),
            "state read for cycle"
        );
        let intended = state.deployments().map_err(|e| e.to_string())?;

        let mut recorder = self.resolver.begin(intended, state.defs);
        board.write().await.live = Some(recorder.status_cell());

        let outcome = recorder.wait().await;
        let stable = recorder.current_status().await;

        {
            let mut board = board.write().await;
            board.stable = Some(stable);
            board.live = None;
        }
        outcome.map_err(|e| e.to_string())
    }
}

/// Handle onto a running auto-resolver.
pub struct AutoResolverHandle {
    poke_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    board: Arc<RwLock<StatusBoard>>,
    announce: broadcast::Sender<CycleOutcome>,
    task: JoinHandle<()>,
}

impl AutoResolverHandle {
    /// The stable (previous complete) and live (in-progress) statuses.
    pub async fn statuses(&self) -> (Option<ResolveStatus>, Option<ResolveStatus>) {
        let board = self.board.read().await;
        let live = match &board.live {
            Some(cell) => Some(cell.read().await.clone()),
            None => None,
        };
        (board.stable.clone(), live)
    }

    /// Request an immediate follow-up cycle.
    ///
    /// Pokes coalesce: at most one follow-up is pending at a time.
    pub fn poke(&self) {
        let _ = self.poke_tx.try_send(());
    }

    /// Subscribe to cycle outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<CycleOutcome> {
        self.announce.subscribe()
    }

    /// Stop the loop at the next safe point and wait for it to exit.
    ///
    /// In-flight queue workers run their current action to completion on
    /// their own tasks; no new cycles start.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use recon_core::{
        BuildArtifact, Cluster, Defs, DeployablePair, Deployments, DeployResult,
        DiffResolution, InMemoryStateManager, Manifest, ResolutionType, SourceId, SourceLocation,
        State,
    };
    use semver::Version;
    use std::collections::BTreeMap;

    use crate::deployer::Deployer;
    use crate::error::EngineResult;
    use crate::queue_set::{QueueSetConfig, R11nQueueSet};
    use crate::registry::Registry;

    struct OkRegistry;

    #[async_trait]
    impl Registry for OkRegistry {
        async fn get_artifact(&self, source_id: &SourceId) -> EngineResult<BuildArtifact> {
            Ok(BuildArtifact {
                name: format!("registry.example.com/{}", source_id.location.repo),
                kind: "docker".to_string(),
                qualities: Vec::new(),
            })
        }
    }

    struct EmptyDeployer;

    #[async_trait]
    impl Deployer for EmptyDeployer {
        async fn running_deployments(&self, _defs: &Defs) -> EngineResult<Deployments> {
            Ok(Deployments::new())
        }

        async fn rectify(&self, pair: &DeployablePair) -> DiffResolution {
            DiffResolution::ok(pair.id.clone(), ResolutionType::Created)
        }
    }

    struct FailingReader;

    #[async_trait]
    impl recon_core::StateReader for FailingReader {
        async fn read_state(&self) -> DeployResult<State> {
            Err(recon_core::DeployError::Transport("store down".into()))
        }
    }

    fn test_state() -> State {
        let mut state = State::new();
        state.defs = Defs::new().with_cluster(Cluster::new("cluster-1", "http://c1.example.com"));
        let mut manifest = Manifest::new(SourceLocation::new("github.com/example/one", ""));
        manifest.deployments.insert("cluster-1".to_string(), {
            let mut spec = recon_core::DeploySpec::new(
                Version::new(1, 1, 1),
                recon_core::DeployConfig::default(),
            );
            spec.deploy_config.num_instances = 1;
            spec
        });
        state.manifests.add(manifest).unwrap();
        state
    }

    fn auto_resolver(reader: Arc<dyn recon_core::StateReader>) -> AutoResolver {
        let deployer = Arc::new(EmptyDeployer);
        let queues = Arc::new(R11nQueueSet::new(deployer.clone(), QueueSetConfig::default()));
        let resolver = Resolver::new(Arc::new(OkRegistry), deployer, queues);
        AutoResolver::new(resolver, reader).with_update_interval(Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_first_cycle_publishes_stable_status() {
        let reader = Arc::new(InMemoryStateManager::new(test_state()));
        let handle = auto_resolver(reader).kickoff();
        let mut outcomes = handle.subscribe();

        outcomes.recv().await.unwrap().unwrap();
        let (stable, live) = handle.statuses().await;
        let stable = stable.expect("stable status after first cycle");
        assert_eq!(stable.phase, ResolvePhase::Complete);
        assert_eq!(stable.log.len(), 1);
        assert_eq!(stable.log[0].desc, ResolutionType::Created);
        assert!(live.is_none());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_poke_triggers_follow_up_cycle() {
        let reader = Arc::new(InMemoryStateManager::new(test_state()));
        let handle = auto_resolver(reader).kickoff();
        let mut outcomes = handle.subscribe();

        outcomes.recv().await.unwrap().unwrap();
        handle.poke();
        let second = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .expect("poked cycle should run well before the timer");
        second.unwrap().unwrap();

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_read_failure_announced_and_loop_survives() {
        let handle = auto_resolver(Arc::new(FailingReader)).kickoff();
        let mut outcomes = handle.subscribe();

        let outcome = outcomes.recv().await.unwrap();
        assert!(outcome.unwrap_err().contains("store down"));
        let (stable, live) = handle.statuses().await;
        assert!(stable.is_none());
        assert!(live.is_none());

        // The loop is still alive and poke-able.
        handle.poke();
        let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .expect("loop should survive a read failure");
        assert!(outcome.unwrap().is_err());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_cycles() {
        let reader = Arc::new(InMemoryStateManager::new(test_state()));
        let handle = auto_resolver(reader).kickoff();
        let mut outcomes = handle.subscribe();
        outcomes.recv().await.unwrap().unwrap();

        handle.shutdown().await;
        // No further outcomes arrive once the loop has exited.
        let after = tokio::time::timeout(Duration::from_millis(300), outcomes.recv()).await;
        assert!(matches!(
            after,
            Err(_) | Ok(Err(broadcast::error::RecvError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_statuses_reflect_resolution_log() {
        let reader = Arc::new(InMemoryStateManager::new(test_state()));
        let handle = auto_resolver(reader).kickoff();
        let mut outcomes = handle.subscribe();
        outcomes.recv().await.unwrap().unwrap();

        let (stable, _) = handle.statuses().await;
        let log: BTreeMap<String, ResolutionType> = stable
            .unwrap()
            .log
            .iter()
            .map(|r| (r.id.to_string(), r.desc))
            .collect();
        assert!(log.keys().any(|k| k.contains("github.com/example/one")));

        handle.shutdown().await;
    }
}
