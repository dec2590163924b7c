//! State: the manifest set plus its cluster definitions
//!
//! `State` is what the persistence backend round-trips and what every
//! resolution cycle starts from. The backends themselves are out of scope;
//! `StateReader`/`StateWriter` pin their interface and
//! `InMemoryStateManager` provides the embedded implementation used by
//! tests and single-process deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DeployResult;
use crate::logging::operations;
use crate::types::{Defs, Manifests};

/// The declared intent across all clusters, with the cluster registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// All manifests, keyed by manifest id
    #[serde(default)]
    pub manifests: Manifests,
    /// Cluster definitions the manifests refer to
    #[serde(default)]
    pub defs: Defs,
}

impl State {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }
}

/// The operator a write is attributed to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
}

impl User {
    /// Create a user record
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Read access to the persisted state.
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Fetch the current state snapshot
    async fn read_state(&self) -> DeployResult<State>;
}

/// Write access to the persisted state.
#[async_trait]
pub trait StateWriter: Send + Sync {
    /// Persist a state snapshot, attributing the write to a user
    async fn write_state(&self, state: &State, user: &User) -> DeployResult<()>;
}

/// Combined read/write access.
pub trait StateManager: StateReader + StateWriter {}

impl<T: StateReader + StateWriter> StateManager for T {}

/// A process-local state store.
#[derive(Debug, Default)]
pub struct InMemoryStateManager {
    state: RwLock<State>,
}

impl InMemoryStateManager {
    /// Create a store holding the given state
    pub fn new(state: State) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }
}

#[async_trait]
impl StateReader for InMemoryStateManager {
    async fn read_state(&self) -> DeployResult<State> {
        Ok(self.state.read().await.clone())
    }
}

#[async_trait]
impl StateWriter for InMemoryStateManager {
    async fn write_state(&self, state: &State, user: &User) -> DeployResult<()> {
        tracing::debug!(
            operation = operations::STATE_WRITE,
            user = %user.name,
            manifests = state.manifests.len(),
            "writing state"
        );
        *self.state.write().await = state.clone();
        Ok(())
    }
}
