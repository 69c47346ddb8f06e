//! HTTP fetch layer
//!
//! Composable clients over the `http` request/response types:
//! - [`BasicClient`]: the single `execute` seam every layer implements
//! - [`UreqClient`]: production transport
//! - [`WithUserAgent`]: stamps a fixed `User-Agent`
//! - [`CachedClient`]: single-flight, time-warp aware GET/HEAD cache

mod cached;
mod client;

pub use cached::{CacheKey, CachedClient, CachedResponse};
pub use client::{UreqClient, WithUserAgent};

use std::sync::Arc;

use ureq::http::{Request, Response, StatusCode};

use crate::cache::CacheError;

/// Default `User-Agent` sent by the lane.
pub const DEFAULT_USER_AGENT: &str = concat!("rebuild-lane/", env!("CARGO_PKG_VERSION"));

/// HTTP errors
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),

    #[error("invalid request: {0}")]
    Request(#[from] ureq::http::Error),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] ureq::http::header::InvalidHeaderValue),

    #[error("fetching {url}: unexpected status {status}")]
    Status { url: String, status: u16 },

    #[error("corrupt cache entry for {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("cache error: {0}")]
    Cache(CacheError),
}

impl HttpError {
    /// Recover an `HttpError` that crossed the cache boundary.
    fn from_cache(err: CacheError) -> Self {
        if let CacheError::Compute(inner) = &err {
            if let Some(HttpError::Status { url, status }) = inner.downcast_ref::<HttpError>() {
                return HttpError::Status {
                    url: url.clone(),
                    status: *status,
                };
            }
        }
        HttpError::Cache(err)
    }
}

/// Minimal request/response seam.
pub trait BasicClient: Send + Sync {
    fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpError>;
}

impl<T: BasicClient + ?Sized> BasicClient for Arc<T> {
    fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpError> {
        (**self).execute(request)
    }
}

impl<T: BasicClient + ?Sized> BasicClient for &T {
    fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpError> {
        (**self).execute(request)
    }
}

/// GET `url` and return the body, treating anything but 200 as an error.
pub fn fetch_bytes<C: BasicClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>, HttpError> {
    let request = Request::get(url).body(Vec::new())?;
    let response = client.execute(request)?;
    if response.status() != StatusCode::OK {
        return Err(HttpError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(response.into_body())
}
