//! Transport and header-stamping clients.

use std::time::Duration;

use tracing::debug;
use ureq::http::header::{HeaderValue, USER_AGENT};
use ureq::http::{Request, Response};

use super::{BasicClient, HttpError};

/// Production client over a shared `ureq::Agent`.
///
/// Non-2xx statuses are returned as responses; bodies are read in full.
#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BasicClient for UreqClient {
    fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpError> {
        debug!(method = %request.method(), uri = %request.uri(), "http request");
        let response = self.agent.run(request)?;
        let (parts, mut body) = response.into_parts();
        let bytes = body.with_config().limit(u64::MAX).read_to_vec()?;
        Ok(Response::from_parts(parts, bytes))
    }
}

/// Sets `User-Agent` on every request before delegating.
pub struct WithUserAgent<C> {
    inner: C,
    user_agent: HeaderValue,
}

impl<C> WithUserAgent<C> {
    pub fn new(inner: C, user_agent: &str) -> Result<Self, HttpError> {
        Ok(Self {
            inner,
            user_agent: HeaderValue::from_str(user_agent)?,
        })
    }
}

impl<C: BasicClient> BasicClient for WithUserAgent<C> {
    fn execute(&self, mut request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpError> {
        request
            .headers_mut()
            .insert(USER_AGENT, self.user_agent.clone());
        self.inner.execute(request)
    }
}
