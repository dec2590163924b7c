//! recon-engine — the reconciliation engine
//!
//! Drives the gap between declared intent and what the downstream
//! orchestrator actually runs:
//!
//! - [`Registry`] and [`Deployer`] pin the external collaborators.
//! - [`NameResolver`] attaches build artifacts to intended deployments and
//!   enforces the per-cluster advisory allow-list.
//! - [`DeployableChans`] chains [`PairProcessor`]s into the standard
//!   pipeline: name resolution, logging, executor handoff.
//! - [`R11nQueueSet`] serialises rectifications per deployment id with
//!   single-flight workers while keeping distinct deployments parallel.
//! - [`Resolver`] runs one cycle; [`AutoResolver`] loops it forever with
//!   timer and poke triggers, publishing stable/live status snapshots.

pub mod auto_resolver;
pub mod deployer;
pub mod error;
pub mod name_resolver;
pub mod pipeline;
pub mod queue_set;
pub mod registry;
pub mod resolver;

pub use auto_resolver::{AutoResolver, AutoResolverHandle, CycleOutcome, DEFAULT_UPDATE_INTERVAL};
pub use deployer::Deployer;
pub use error::{EngineError, EngineResult};
pub use name_resolver::NameResolver;
pub use pipeline::{DeployableChans, LoggingProcessor, PairOutcome, PairProcessor};
pub use queue_set::{QueueSetConfig, R11nQueueSet, R11nState};
pub use registry::Registry;
pub use resolver::{ResolvePhase, Resolver, ResolveRecorder, ResolveStatus};
