//! In-process test doubles
//!
//! Mocks for the lane's external seams, usable from unit and integration
//! tests:
//! - [`MockHttpClient`]: canned responses by URL, with a request log
//! - [`MockBuildService`]: scripted remote build progressions
//! - [`MockRegistry`]: fixed release listings

mod build_service;
mod http;
mod registry;

pub use build_service::MockBuildService;
pub use http::{MockHttpClient, RecordedRequest};
pub use registry::MockRegistry;
