//! Remote build service wire types
//!
//! JSON shapes exchanged with the remote execution service: build jobs and
//! their steps, long-running operations, build status, and service errors.

pub mod build;
pub mod error;
pub mod operation;

pub use build::{Build, BuildJob, BuildResults, BuildStatus, BuildStep, UnknownStatus};
pub use error::{ErrorCode, ServiceError};
pub use operation::{Operation, OperationMetadata};

/// Default timeout requested for a remote build, in seconds.
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 3600;
