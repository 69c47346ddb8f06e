//! Remote build service seam and its HTTP implementation.

use std::sync::Arc;

use rebuild_protocol::{BuildJob, ErrorCode, Operation, ServiceError};
use serde::de::DeserializeOwned;
use tracing::debug;
use ureq::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use ureq::http::Request;

use crate::http::BasicClient;

/// Operations the orchestrator needs from a remote build service.
pub trait RemoteBuildService: Send + Sync {
    /// Submit `job` and return its pending operation.
    fn create_build(&self, project: &str, job: &BuildJob) -> Result<Operation, ServiceError>;

    /// Refresh `op`.
    fn get_operation(&self, op: &Operation) -> Result<Operation, ServiceError>;

    /// Ask the service to stop a build.
    fn cancel_build(&self, project: &str, build_id: &str) -> Result<(), ServiceError>;
}

impl<T: RemoteBuildService + ?Sized> RemoteBuildService for Arc<T> {
    fn create_build(&self, project: &str, job: &BuildJob) -> Result<Operation, ServiceError> {
        (**self).create_build(project, job)
    }

    fn get_operation(&self, op: &Operation) -> Result<Operation, ServiceError> {
        (**self).get_operation(op)
    }

    fn cancel_build(&self, project: &str, build_id: &str) -> Result<(), ServiceError> {
        (**self).cancel_build(project, build_id)
    }
}

/// JSON-over-HTTP build service client.
///
/// Endpoints, relative to `base_url`:
/// - `POST projects/{project}/builds` with a [`BuildJob`] body
/// - `GET {operation name}`
/// - `POST projects/{project}/builds/{id}:cancel`
///
/// Every call is sent with `Cache-Control: no-cache`, so polling stays live
/// even when `client` is a [`CachedClient`](crate::http::CachedClient).
pub struct HttpBuildService<C> {
    client: C,
    base_url: String,
}

impl<C: BasicClient> HttpBuildService<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<T, ServiceError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(method, url = %url, "build service call");
        let request = Request::builder()
            .method(method)
            .uri(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .body(body)
            .map_err(|e| ServiceError::invalid_job(e.to_string()))?;
        let response = self
            .client
            .execute(request)
            .map_err(|e| ServiceError::new(ErrorCode::Unavailable, e.to_string()))?;

        let status = response.status();
        let body = response.into_body();
        if !status.is_success() {
            // Services report structured errors; fall back to the status line.
            return Err(serde_json::from_slice::<ServiceError>(&body).unwrap_or_else(|_| {
                let code = match status.as_u16() {
                    400 => ErrorCode::InvalidArgument,
                    403 => ErrorCode::PermissionDenied,
                    404 => ErrorCode::NotFound,
                    429 => ErrorCode::ResourceExhausted,
                    502..=504 => ErrorCode::Unavailable,
                    _ => ErrorCode::Internal,
                };
                ServiceError::new(code, format!("{} returned {}", url, status))
            }));
        }
        serde_json::from_slice(&body)
            .map_err(|e| ServiceError::new(ErrorCode::Internal, format!("invalid response: {}", e)))
    }
}

impl<C: BasicClient> RemoteBuildService for HttpBuildService<C> {
    fn create_build(&self, project: &str, job: &BuildJob) -> Result<Operation, ServiceError> {
        let body = serde_json::to_vec(job).map_err(|e| ServiceError::invalid_job(e.to_string()))?;
        self.call("POST", &format!("projects/{}/builds", project), body)
    }

    fn get_operation(&self, op: &Operation) -> Result<Operation, ServiceError> {
        self.call("GET", &op.name, Vec::new())
    }

    fn cancel_build(&self, project: &str, build_id: &str) -> Result<(), ServiceError> {
        let _: serde_json::Value = self.call(
            "POST",
            &format!("projects/{}/builds/{}:cancel", project, build_id),
            Vec::new(),
        )?;
        Ok(())
    }
}
