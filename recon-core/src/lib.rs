//! recon-core — the deployment model
//!
//! The core entities of the recon cluster deployment controller and the
//! algebra that relates them:
//!
//! - **Typed identifiers**: [`SourceLocation`], [`SourceId`], [`ManifestId`]
//!   and [`DeploymentId`], the canonical identity key of the system.
//! - **Intent**: [`Manifest`]s hold per-cluster [`DeploySpec`]s, with the
//!   reserved `Global` key carrying inherited configuration.
//! - **Realisation**: flatten turns manifests plus cluster [`Defs`] into
//!   concrete [`Deployment`]s; gather is its inverse.
//! - **Reconciliation currency**: [`DeployablePair`]s classify intended vs
//!   actual state; [`DiffResolution`]s record what was done about it;
//!   [`Rectification`]s travel through the queue set.
//! - **State**: the persisted [`State`] snapshot plus the pinned
//!   [`StateReader`]/[`StateWriter`] interfaces of the storage backends.
//!
//! Everything here is synchronous and side-effect free apart from the
//! state traits; the engine crate supplies the control loops.

pub mod diff;
pub mod error;
pub mod flatten;
pub mod logging;
pub mod state;
pub mod types;

pub use diff::diff_deployments;
pub use error::{DeployError, DeployResult, ErrorWrapper, ResolveError};
pub use state::{InMemoryStateManager, State, StateManager, StateReader, StateWriter, User};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
