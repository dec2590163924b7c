//! Rectification queue set
//!
//! One FIFO per deployment id, each consumed by a single worker task, so
//! actions on one deployment execute strictly in enqueue order while
//! different deployments rectify in parallel. Workers spawn on first use
//! and retire after a bounded idle period; retirement and push contend on
//! the queue table lock, so a worker never disappears while an item is in
//! flight toward it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;

use recon_core::logging::operations;
use recon_core::{
    DeploymentId, DiffResolution, ErrorWrapper, QueuedR11n, R11nId, Rectification,
    ResolutionType, ResolveError,
};

use crate::deployer::Deployer;

/// Tuning for the queue set.
#[derive(Clone, Debug)]
pub struct QueueSetConfig {
    /// Maximum queued-or-executing rectifications per deployment id.
    ///
    /// The bound is an operator decision; the default suits interactive
    /// deploys where a handful of stacked updates already signals trouble.
    pub capacity: usize,
    /// How long an idle worker lingers before retiring
    pub idle_timeout: Duration,
}

impl Default for QueueSetConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// The observable state of a queued action.
#[derive(Clone, Debug, PartialEq)]
pub enum R11nState {
    /// Waiting for, or undergoing, execution
    Queued,
    /// Executed; the resolution is final
    Resolved(DiffResolution),
}

struct QueueEntry {
    tx: mpsc::UnboundedSender<QueuedR11n>,
    len: Arc<AtomicUsize>,
}

enum Slot {
    Pending(Vec<oneshot::Sender<DiffResolution>>),
    Done(DiffResolution),
}

/// A keyed set of rectification queues with single-flight execution per key.
pub struct R11nQueueSet {
    deployer: Arc<dyn Deployer>,
    config: QueueSetConfig,
    queues: Arc<Mutex<HashMap<DeploymentId, QueueEntry>>>,
    slots: Arc<Mutex<HashMap<R11nId, Slot>>>,
}

impl R11nQueueSet {
    /// Create a queue set executing through the given deployer
    pub fn new(deployer: Arc<dyn Deployer>, config: QueueSetConfig) -> Self {
        Self {
            deployer,
            config,
            queues: Arc::new(Mutex::new(HashMap::new())),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append a rectification to its deployment's queue.
    ///
    /// Returns `None` when the per-key queue is at capacity.
    pub async fn push(&self, rectification: Rectification) -> Option<QueuedR11n> {
        self.enqueue(rectification, false).await
    }

    /// Append only when the deployment's queue is empty.
    ///
    /// Used to coalesce rapid duplicates: if an action is already queued or
    /// executing for this id, the new one is dropped.
    pub async fn push_if_empty(&self, rectification: Rectification) -> Option<QueuedR11n> {
        self.enqueue(rectification, true).await
    }

    async fn enqueue(&self, rectification: Rectification, only_if_empty: bool) -> Option<QueuedR11n> {
        let id = rectification.id();
        let mut queues = self.queues.lock().await;
        let entry = queues
            .entry(id.clone())
            .or_insert_with(|| self.spawn_worker(id.clone()));

        let len = entry.len.load(Ordering::SeqCst);
        if only_if_empty && len != 0 {
            tracing::debug!(deployment_id = %id, "queue not empty, coalescing");
            return None;
        }
        if len >= self.config.capacity {
            tracing::warn!(deployment_id = %id, capacity = self.config.capacity, "queue full");
            return None;
        }

        let queued = QueuedR11n {
            id: R11nId::generate(),
            position: len,
            rectification,
        };
        // The slot must exist before the worker can possibly resolve it.
        self.slots
            .lock()
            .await
            .insert(queued.id.clone(), Slot::Pending(Vec::new()));
        entry.len.fetch_add(1, Ordering::SeqCst);

        if entry.tx.send(queued.clone()).is_err() {
            // Worker cannot retire while we hold the table lock, so this
            // only fires if its task was aborted externally.
            entry.len.fetch_sub(1, Ordering::SeqCst);
            self.slots.lock().await.remove(&queued.id);
            return None;
        }
        tracing::debug!(
            operation = operations::QUEUE_PUSH,
            deployment_id = %queued.rectification.id(),
            action_id = %queued.id,
            position = queued.position,
            "rectification queued"
        );
        Some(queued)
    }

    /// Block until the named action has been executed and resolved.
    ///
    /// Returns `None` for an unknown action id.
    pub async fn wait(&self, id: &R11nId) -> Option<DiffResolution> {
        let rx = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(id) {
                None => return None,
                Some(Slot::Done(resolution)) => return Some(resolution.clone()),
                Some(Slot::Pending(waiters)) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
            }
        };
        rx.await.ok()
    }

    /// The current state of a queued action, without blocking.
    pub async fn status(&self, id: &R11nId) -> Option<R11nState> {
        let slots = self.slots.lock().await;
        match slots.get(id) {
            None => None,
            Some(Slot::Pending(_)) => Some(R11nState::Queued),
            Some(Slot::Done(resolution)) => Some(R11nState::Resolved(resolution.clone())),
        }
    }

    /// Queue lengths (queued plus executing) per deployment id.
    pub async fn queue_lens(&self) -> BTreeMap<DeploymentId, usize> {
        let queues = self.queues.lock().await;
        queues
            .iter()
            .map(|(id, entry)| (id.clone(), entry.len.load(Ordering::SeqCst)))
            .collect()
    }

    fn spawn_worker(&self, key: DeploymentId) -> QueueEntry {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedR11n>();
        let len = Arc::new(AtomicUsize::new(0));

        let deployer = self.deployer.clone();
        let queues = self.queues.clone();
        let slots = self.slots.clone();
        let worker_len = len.clone();
        let idle = self.config.idle_timeout;
        let worker_key = key.clone();

        tokio::spawn(async move {
            loop {
                match timeout(idle, rx.recv()).await {
                    Ok(Some(queued)) => {
                        let resolution = execute(deployer.as_ref(), &queued).await;
                        worker_len.fetch_sub(1, Ordering::SeqCst);
                        tracing::debug!(
                            operation = operations::RECTIFY,
                            deployment_id = %worker_key,
                            action_id = %queued.id,
                            resolution = %resolution.desc,
                            "rectification executed"
                        );
                        resolve_slot(&slots, queued.id, resolution).await;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        let mut queues = queues.lock().await;
                        if worker_len.load(Ordering::SeqCst) == 0 {
                            queues.remove(&worker_key);
                            tracing::debug!(deployment_id = %worker_key, "idle queue worker retired");
                            break;
                        }
                        // An item landed during the idle race; keep serving.
                    }
                }
            }
        });

        QueueEntry { tx, len }
    }
}

/// Run one rectification, converting an executor panic into a resolution
/// rather than tearing down the worker.
async fn execute(deployer: &dyn Deployer, queued: &QueuedR11n) -> DiffResolution {
    let id = queued.rectification.id();
    match AssertUnwindSafe(deployer.rectify(&queued.rectification.pair))
        .catch_unwind()
        .await
    {
        Ok(resolution) => resolution,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "executor panicked".to_string());
            tracing::error!(
                operation = operations::RECTIFY,
                deployment_id = %id,
                error = %message,
                "executor crashed"
            );
            DiffResolution::errored(
                id,
                ResolutionType::Errored,
                ErrorWrapper::from(&ResolveError::ExecutorCrash(message)),
            )
        }
    }
}

async fn resolve_slot(
    slots: &Mutex<HashMap<R11nId, Slot>>,
    id: R11nId,
    resolution: DiffResolution,
) {
    let mut slots = slots.lock().await;
    if let Some(Slot::Pending(waiters)) = slots.remove(&id) {
        for waiter in waiters {
            let _ = waiter.send(resolution.clone());
        }
    }
    slots.insert(id, Slot::Done(resolution));
}
