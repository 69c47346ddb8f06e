//! Response caching for idempotent requests.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ureq::http::header::CACHE_CONTROL;
use ureq::http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri};

use super::{BasicClient, HttpError};
use crate::cache::{Cache, ComputeError};

/// Cache key for a request: the absolute URI, optionally pinned to an instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for `uri` as of "now".
    pub fn for_uri(uri: &Uri) -> Self {
        Self(uri.to_string())
    }

    /// Key for `uri` as observed at `at`: `<uri>@<rfc3339>`.
    pub fn at(uri: &Uri, at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}@{}",
            uri,
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ))
    }

    /// Separate entry for HEAD, whose responses carry no body.
    fn head(self) -> Self {
        Self(format!("HEAD {}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Serialized form of a cached 200 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Base64 body
    pub body: String,
}

impl CachedResponse {
    fn capture(response: &Response<Vec<u8>>) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            body: BASE64.encode(response.body()),
        }
    }

    fn into_response(self, key: &CacheKey) -> Result<Response<Vec<u8>>, HttpError> {
        let corrupt = |reason: String| HttpError::CorruptEntry {
            key: key.as_str().to_string(),
            reason,
        };
        let body = BASE64.decode(&self.body).map_err(|e| corrupt(e.to_string()))?;
        let mut builder = Response::builder().status(self.status);
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| corrupt(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| corrupt(e.to_string()))?;
            builder = builder.header(name, value);
        }
        Ok(builder.body(body)?)
    }
}

/// Caches successful GET and HEAD responses in a [`Cache`].
///
/// Requests carrying `Cache-Control: no-cache` or `no-store` go straight to
/// the inner client. Entries are stored serialized and rebuilt on every call, so each caller
/// owns an independent body. Non-200 responses are returned as
/// [`HttpError::Status`] and never stored.
pub struct CachedClient<C, K> {
    inner: C,
    cache: K,
    time_warp: Option<DateTime<Utc>>,
}

impl<C: BasicClient, K: Cache<Vec<u8>>> CachedClient<C, K> {
    pub fn new(inner: C, cache: K) -> Self {
        Self {
            inner,
            cache,
            time_warp: None,
        }
    }

    /// Pin cache keys to `at` so fetches for different instants never share entries.
    pub fn with_time_warp(mut self, at: DateTime<Utc>) -> Self {
        self.time_warp = Some(at);
        self
    }

    pub fn time_warp(&self) -> Option<DateTime<Utc>> {
        self.time_warp
    }

    fn key_for(&self, method: &Method, uri: &Uri) -> CacheKey {
        let key = match self.time_warp {
            Some(at) => CacheKey::at(uri, at),
            None => CacheKey::for_uri(uri),
        };
        if method == Method::HEAD {
            key.head()
        } else {
            key
        }
    }
}

impl<C: BasicClient, K: Cache<Vec<u8>>> BasicClient for CachedClient<C, K> {
    fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpError> {
        if request.method() != Method::GET && request.method() != Method::HEAD {
            return self.inner.execute(request);
        }
        if bypasses_cache(&request) {
            debug!(url = %request.uri(), "cache bypassed");
            return self.inner.execute(request);
        }

        let key = self.key_for(request.method(), request.uri());
        let url = request.uri().to_string();
        let mut pending = Some(request);
        let mut compute = || -> Result<Vec<u8>, ComputeError> {
            let request = pending
                .take()
                .ok_or_else(|| ComputeError::from("request already consumed"))?;
            debug!(key = key.as_str(), "cache miss");
            let response = self.inner.execute(request)?;
            if response.status() != StatusCode::OK {
                return Err(Box::new(HttpError::Status {
                    url: url.clone(),
                    status: response.status().as_u16(),
                }));
            }
            Ok(serde_json::to_vec(&CachedResponse::capture(&response))?)
        };

        let stored = self
            .cache
            .get_or_set(key.as_str(), &mut compute)
            .map_err(HttpError::from_cache)?;
        let cached: CachedResponse =
            serde_json::from_slice(&stored).map_err(|e| HttpError::CorruptEntry {
                key: key.as_str().to_string(),
                reason: e.to_string(),
            })?;
        cached.into_response(&key)
    }
}

fn bypasses_cache(request: &Request<Vec<u8>>) -> bool {
    request
        .headers()
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|d| matches!(d.trim().to_ascii_lowercase().as_str(), "no-cache" | "no-store"))
}
