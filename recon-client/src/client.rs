//! HTTP state manager
//!
//! Implements the state interfaces over the server's GDM resource. Reads
//! assemble a full `State` from the manifest and defs listings; writes send
//! the flattened deployment set with an `If-Match` token computed from the
//! state the mutation was based on, so a concurrent write surfaces as a
//! retryable conflict rather than a silent overwrite.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tokio::sync::Mutex;

use recon_api::{GdmWrapper, HEADER_USER_EMAIL, HEADER_USER_NAME};
use recon_core::{
    Defs, DeployError, DeployResult, Manifests, State, StateReader, StateWriter, User,
};

use crate::error::ClientResult;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// State manager speaking to a recon API server.
pub struct HttpStateManager {
    client: Client,
    base_url: String,
    /// Etag of the deployment set the last read observed
    basis: Mutex<Option<String>>,
}

impl HttpStateManager {
    /// Create a client against a server base URL
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            basis: Mutex::new(None),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> DeployResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DeployError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeployError::Storage(format!(
                "GET {path} returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| DeployError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl StateReader for HttpStateManager {
    async fn read_state(&self) -> DeployResult<State> {
        let manifests: Manifests = self.get_json("/manifests").await?;
        let defs: Defs = self.get_json("/defs").await?;
        let state = State { manifests, defs };

        // Remember which deployment set this read corresponds to; the next
        // write claims to supersede exactly this.
        let wrapper = GdmWrapper::from_deployments(&state.deployments()?);
        *self.basis.lock().await = Some(wrapper.etag());

        Ok(state)
    }
}

#[async_trait]
impl StateWriter for HttpStateManager {
    async fn write_state(&self, state: &State, user: &User) -> DeployResult<()> {
        let wrapper = GdmWrapper::from_deployments(&state.deployments()?);
        let url = format!("{}/gdm", self.base_url);

        let mut request = self
            .client
            .put(&url)
            .header(HEADER_USER_NAME, user.name.as_str())
            .header(HEADER_USER_EMAIL, user.email.as_str())
            .json(&wrapper);
        if let Some(basis) = self.basis.lock().await.clone() {
            request = request.header(header::IF_MATCH, basis);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeployError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::CONFLICT => {
                let message = response.text().await.unwrap_or_default();
                Err(DeployError::Conflict(message))
            }
            status if status.is_success() => {
                if let Some(etag) = response
                    .headers()
                    .get(header::ETAG)
                    .and_then(|v| v.to_str().ok())
                {
                    *self.basis.lock().await = Some(etag.to_string());
                }
                Ok(())
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(DeployError::Storage(format!(
                    "PUT /gdm returned {status}: {message}"
                )))
            }
        }
    }
}
