//! Wire-level message shapes produced by the request decoder.

use bytes::Bytes;
use http::{Method, Version};

use crate::protocol::headers::HeaderContainer;

/// One decoded unit of an HTTP request stream: the head, or a body item.
#[derive(Debug)]
pub enum Message {
    Head(RequestHead),
    Payload(PayloadItem),
}

/// A fragment of the request body, or the end-of-message marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    Chunk(Bytes),
    Eof,
}

impl PayloadItem {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// Body framing announced by the request head.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    Length(u64),
    Chunked,
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }
}

/// Request line and headers, decoded and copied out of the read buffer.
#[derive(Debug)]
pub struct RequestHead {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderContainer,
}

impl RequestHead {
    pub fn new(method: Method, target: String, version: Version, headers: HeaderContainer) -> Self {
        Self { method, target, version, headers }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw request target as written on the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderContainer {
        &self.headers
    }

    /// Keep-alive negotiation per RFC 9112: HTTP/1.1 defaults to keep-alive
    /// unless `Connection: close`; HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let connection = self.headers.get("connection");
        match self.version {
            Version::HTTP_10 => connection.is_some_and(|v| has_token(v, b"keep-alive")),
            _ => !connection.is_some_and(|v| has_token(v, b"close")),
        }
    }

    pub fn into_parts(self) -> (Method, String, Version, HeaderContainer) {
        (self.method, self.target, self.version, self.headers)
    }
}

/// Checks a comma-separated header value for a token, ignoring case and
/// surrounding whitespace.
fn has_token(value: &[u8], token: &[u8]) -> bool {
    value.split(|b| *b == b',').any(|part| part.trim_ascii().eq_ignore_ascii_case(token))
}
