//! recon-client — the retry-capable HTTP state client
//!
//! Used by operator commands to read and mutate the GDM through the
//! server. [`HttpStateManager`] implements the state interfaces over HTTP
//! with etag-based optimistic concurrency; [`update_retry_loop`] is the
//! single retry policy the system carries, covering write conflicts
//! between racing updates.

pub mod client;
pub mod error;
pub mod update;

pub use client::HttpStateManager;
pub use error::{ClientError, ClientResult};
pub use update::update_retry_loop;
