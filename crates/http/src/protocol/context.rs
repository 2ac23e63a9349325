//! Per-request mutable state shared between the connection and the router.
//!
//! A [`Context`] lives as long as its connection and is `reset` between
//! requests on a keep-alive connection rather than reallocated. The connection
//! fills in the request side from decoded messages; handlers and aspects write
//! the response side; the connection serializes it afterwards.

use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode, Version};
use tracing::debug;

use crate::protocol::headers::HeaderContainer;
use crate::protocol::message::RequestHead;

/// The incoming request: headers plus the accumulated body.
#[derive(Debug, Default)]
pub struct Request {
    headers: HeaderContainer,
    body: BytesMut,
}

impl Request {
    pub fn headers(&self) -> &HeaderContainer {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    fn reset(&mut self) {
        self.headers.clear();
        self.body.clear();
    }
}

/// The response under construction.
///
/// The first status write wins: once a status is set, later writes are ignored
/// until [`Response::clear`], which exists for the error path where a handler
/// failed after partial output.
#[derive(Debug, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderContainer,
    body: BytesMut,
}

impl Response {
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderContainer {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderContainer {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Sets the status line unless one was already written.
    pub fn set_status(&mut self, status: StatusCode) {
        if let Some(current) = self.status {
            debug!(%current, attempted = %status, "response status already written, ignoring");
            return;
        }
        self.status = Some(status);
    }

    /// Appends bytes to the response body.
    pub fn append_body(&mut self, bytes: impl AsRef<[u8]>) {
        self.body.extend_from_slice(bytes.as_ref());
    }

    /// Discards everything written so far, status included.
    pub fn clear(&mut self) {
        self.status = None;
        self.headers.clear();
        self.body.clear();
    }

    fn reset(&mut self) {
        self.clear();
    }
}

/// Mutable bundle of one in-flight request/response exchange.
#[derive(Debug, Default)]
pub struct Context {
    method: Method,
    raw_url: String,
    version: Version,
    path_params: Vec<String>,
    tail: Option<String>,
    query: Option<Vec<(String, String)>>,
    request: Request,
    response: Response,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a decoded request head. Called by the connection once per
    /// request, before any body fragment arrives.
    pub fn apply_head(&mut self, head: RequestHead) {
        let (method, target, version, headers) = head.into_parts();
        self.method = method;
        self.raw_url = target;
        self.version = version;
        self.request.headers = headers;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw request target, query string included.
    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// The path-only portion of the request target.
    pub fn path(&self) -> &str {
        match self.raw_url.find('?') {
            Some(at) => &self.raw_url[..at],
            None => &self.raw_url,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// First request-header value under `name`.
    pub fn header(&self, name: impl AsRef<[u8]>) -> Option<&Bytes> {
        self.request.headers.get(name)
    }

    /// Appends a decoded body fragment. Fragments accumulate; they never
    /// replace what is already there.
    pub fn append_request_body(&mut self, bytes: &[u8]) {
        self.request.body.extend_from_slice(bytes);
    }

    /// Query-string pairs, tokenized once on first access.
    pub fn query(&mut self) -> &[(String, String)] {
        if self.query.is_none() {
            let raw = match self.raw_url.find('?') {
                Some(at) => &self.raw_url[at + 1..],
                None => "",
            };
            let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(raw).unwrap_or_else(|e| {
                debug!(cause = %e, "malformed query string, treating as empty");
                Vec::new()
            });
            self.query = Some(pairs);
        }
        self.query.as_deref().unwrap_or_default()
    }

    /// First query value under `name`.
    pub fn query_value(&mut self, name: &str) -> Option<&str> {
        self.query().iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Installs the path segments captured by the routing trie.
    pub fn set_path_params(&mut self, params: Vec<String>, tail: Option<String>) {
        self.path_params = params;
        self.tail = tail;
    }

    /// Captured typed path segments, left to right.
    pub fn path_params(&self) -> &[String] {
        &self.path_params
    }

    /// Parses the `index`-th captured segment.
    pub fn path_param<T: FromStr>(&self, index: usize) -> Option<T> {
        self.path_params.get(index).and_then(|raw| raw.parse().ok())
    }

    /// The remainder consumed by a tail wildcard, if the matched route had one.
    pub fn tail(&self) -> Option<&str> {
        self.tail.as_deref()
    }

    /// Whether a status line has been written.
    pub fn response_written(&self) -> bool {
        self.response.status.is_some()
    }

    /// Writes a status with an empty body. First write wins.
    pub fn write_status(&mut self, status: StatusCode) {
        self.response.set_status(status);
    }

    /// Writes a status and body. First write wins; a second call neither
    /// changes the status nor appends.
    pub fn write(&mut self, status: StatusCode, body: impl AsRef<[u8]>) {
        if self.response.status.is_some() {
            debug!(attempted = %status, "response already written, ignoring write");
            return;
        }
        self.response.status = Some(status);
        self.response.body.extend_from_slice(body.as_ref());
    }

    /// Discards any partially written response. Used by the router when an
    /// aspect or handler fails after producing output.
    pub fn clear_response(&mut self) {
        self.response.clear();
    }

    /// Clears all per-request state so the connection can reuse this context
    /// for the next request on the same socket.
    pub fn reset(&mut self) {
        self.method = Method::default();
        self.raw_url.clear();
        self.version = Version::default();
        self.path_params.clear();
        self.tail = None;
        self.query = None;
        self.request.reset();
        self.response.reset();
    }
}
