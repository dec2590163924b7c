//! recon-api — the HTTP state surface
//!
//! Read/write endpoints over the GDM, the interactive single-deployment
//! exchange that writes state and queues a rectification, queue
//! inspection, and the resolve status resource. Collaborators (state
//! store, queue set, auto-resolver) are injected through [`AppState`].

pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use dto::{
    ComparableBody, DeploymentQueuesResponse, GdmWrapper, NameData, QueueDesc, QueueItemResponse,
    ResponseMeta, ServerListData, SingleDeploymentBody, StatusResponse, HEADER_USER_EMAIL,
    HEADER_USER_NAME,
};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::{create_server, run_server, start_background_server};
pub use state::{ApiConfig, AppState};
