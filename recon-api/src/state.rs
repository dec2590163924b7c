//! Application state for the API server

use std::sync::Arc;

use recon_core::StateManager;
use recon_engine::{AutoResolverHandle, R11nQueueSet};

/// API server state
#[derive(Clone)]
pub struct AppState {
    /// The state store behind the GDM and single-deployment resources
    pub state_manager: Arc<dyn StateManager>,
    /// The rectification queue set fed by deployment PUTs
    pub queues: Arc<R11nQueueSet>,
    /// Handle onto the auto-resolver, when one is running in-process
    pub auto_resolver: Option<Arc<AutoResolverHandle>>,
    /// API version
    pub version: String,
}

impl AppState {
    /// Create app state from injected collaborators
    pub fn new(state_manager: Arc<dyn StateManager>, queues: Arc<R11nQueueSet>) -> Self {
        Self {
            state_manager,
            queues,
            auto_resolver: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Attach a running auto-resolver so `/status` can report it
    pub fn with_auto_resolver(mut self, handle: Arc<AutoResolverHandle>) -> Self {
        self.auto_resolver = Some(handle);
        self
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: false,
        }
    }
}
