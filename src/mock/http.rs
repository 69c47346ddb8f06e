//! In-process HTTP responder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ureq::http::header::{CONTENT_LENGTH, USER_AGENT};
use ureq::http::{Method, Request, Response};

use crate::http::{BasicClient, HttpError};

/// A request as seen by [`MockHttpClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub user_agent: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Canned {
    status: u16,
    body: Vec<u8>,
}

/// Serves canned responses by exact URL; unknown URLs get 404.
///
/// Clones share routes and the request log.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    routes: Arc<Mutex<HashMap<String, Canned>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `status` with `body` for `url`.
    pub fn respond(&self, url: &str, status: u16, body: &[u8]) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Canned {
                status,
                body: body.to_vec(),
            },
        );
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl BasicClient for MockHttpClient {
    fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpError> {
        let uri = request.uri().to_string();
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let method = request.method().clone();
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.clone(),
            uri: uri.clone(),
            user_agent,
            body: request.into_body(),
        });

        let canned = self
            .routes
            .lock()
            .unwrap()
            .get(&uri)
            .cloned()
            .unwrap_or(Canned {
                status: 404,
                body: Vec::new(),
            });
        let body = if method == Method::HEAD {
            Vec::new()
        } else {
            canned.body.clone()
        };
        Ok(Response::builder()
            .status(canned.status)
            .header(CONTENT_LENGTH, canned.body.len())
            .body(body)?)
    }
}
