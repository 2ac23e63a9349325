//! Incremental decoder for the request line and headers.
//!
//! Built on `httparse`: the connection keeps appending read bytes to its input
//! buffer and calls [`HeadDecoder::decode`] after every read. `httparse`
//! reports `Partial` until the final CRLF CRLF arrives, so a head split across
//! any number of reads parses the same as one that arrived whole. Everything
//! the decoded head needs is copied out of the buffer before the call returns;
//! the buffer is advanced past the head and is free to be reused.

use bytes::{Buf, Bytes, BytesMut};
use http::{Method, Version};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{HeaderContainer, ParseError, PayloadSize, RequestHead};
use crate::utils::ensure;

/// Maximum number of header entries accepted in one request.
const MAX_HEADER_NUM: usize = 64;

/// Shortest parseable request: `GET / HTTP/1.1\r\n\r\n` is 18 bytes, but
/// `httparse` can start rejecting garbage earlier than that.
const MIN_HEAD_BYTES: usize = 14;

/// Decoder turning raw bytes into a [`RequestHead`] plus the body framing.
#[derive(Debug, Clone, Copy)]
pub struct HeadDecoder {
    max_header_bytes: usize,
    max_url_bytes: usize,
}

impl HeadDecoder {
    pub fn new(max_header_bytes: usize, max_url_bytes: usize) -> Self {
        Self { max_header_bytes, max_url_bytes }
    }
}

impl Decoder for HeadDecoder {
    type Item = (RequestHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < MIN_HEAD_BYTES {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed = req.parse(src).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        match parsed {
            Status::Complete(head_len) => {
                trace!(head_len, "parsed request head");
                ensure!(head_len <= self.max_header_bytes, ParseError::too_large_header(head_len, self.max_header_bytes));

                let version = match req.version {
                    Some(0) => Version::HTTP_10,
                    Some(1) => Version::HTTP_11,
                    // HTTP/2 and HTTP/3 are out of scope
                    v => return Err(ParseError::InvalidVersion(v)),
                };

                let method = req
                    .method
                    .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
                    .ok_or(ParseError::InvalidMethod)?;

                let target = req.path.ok_or_else(|| ParseError::invalid_header("missing request target"))?;
                ensure!(target.len() <= self.max_url_bytes, ParseError::too_large_url(target.len(), self.max_url_bytes));
                let target = target.to_owned();

                // headers are copied out in wire order, duplicates preserved
                let mut container = HeaderContainer::new();
                for header in req.headers.iter() {
                    container.append(Bytes::copy_from_slice(header.name.as_bytes()), Bytes::copy_from_slice(header.value));
                }

                let head = RequestHead::new(method, target, version, container);
                let payload_size = parse_payload_size(&head)?;

                src.advance(head_len);
                Ok(Some((head, payload_size)))
            }

            Status::Partial => {
                // an unfinished head may not grow without bound
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                Ok(None)
            }
        }
    }
}

/// Selects the body framing from Content-Length and Transfer-Encoding,
/// per RFC 9112 section 6: both present at once is an error.
fn parse_payload_size(head: &RequestHead) -> Result<PayloadSize, ParseError> {
    let te = head.headers().get("transfer-encoding");
    let cl = head.headers().get("content-length");

    match (te, cl) {
        (None, None) => Ok(PayloadSize::Empty),

        (Some(te_value), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::Empty)
            }
        }

        (None, Some(cl_value)) => {
            let length = std::str::from_utf8(cl_value)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or_else(|| ParseError::invalid_content_length("value is not an unsigned integer"))?;
            if length == 0 { Ok(PayloadSize::Empty) } else { Ok(PayloadSize::Length(length)) }
        }

        (Some(_), Some(_)) => {
            Err(ParseError::invalid_content_length("transfer-encoding and content-length both present in headers"))
        }
    }
}

/// Chunked must be the last listed transfer coding to apply to the message.
fn is_chunked(value: &[u8]) -> bool {
    value.rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}
