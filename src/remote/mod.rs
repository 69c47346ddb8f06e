//! Remote build orchestration
//!
//! Turns a [`RebuildInput`](crate::rebuild::RebuildInput) into a remote job,
//! submits it to a [`RemoteBuildService`], polls the resulting operation with
//! capped exponential backoff, and records the outcome as a [`BuildInfo`].

mod build_info;
mod job;
mod orchestrator;
mod poll;
mod service;
mod state;

pub use build_info::BuildInfo;
pub use job::{make_build_job, render_dockerfile, BuildDefinition, RemoteOptions, UploadUrls};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RecoveryMode, RemoteJobHandle};
pub use poll::{wait_for_operation, AbortReason, CancelToken, PollOutcome, PollPolicy};
pub use service::{HttpBuildService, RemoteBuildService};
pub use state::{RemoteJobState, RemoteJobTracker, RemoteStateError};

use rebuild_protocol::{BuildStatus, ServiceError};
use thiserror::Error;

use crate::assets::AssetError;

/// Remote orchestration errors
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("build service: {0}")]
    Service(#[from] ServiceError),

    #[error("remote build {} finished with status {status}", .info.build_id)]
    BuildFailed {
        status: BuildStatus,
        info: Box<BuildInfo>,
    },

    #[error("remote build {} aborted: {reason}", .build_id.as_deref().unwrap_or("<unassigned>"))]
    Aborted {
        reason: AbortReason,
        build_id: Option<String>,
    },

    #[error("operation {0} finished without build metadata")]
    MissingBuild(String),

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("job handle: {0}")]
    Handle(#[from] AssetError),

    #[error("job handle JSON: {0}")]
    HandleJson(#[from] serde_json::Error),

    #[error(transparent)]
    State(#[from] RemoteStateError),
}
