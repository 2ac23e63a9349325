//! Serializer for the response held in a [`Response`].
//!
//! Writes the status line, the handler's explicit headers, then the
//! synthesized `Content-Length`, `Server`, `Date` and `Connection: close`
//! headers (each only when not explicitly set), then the body.

use bytes::{BufMut, BytesMut};
use http::StatusCode;
use tokio_util::codec::Encoder;

use crate::date;
use crate::protocol::{Response, SendError};

const SERVER_NAME: &[u8] = b"arbor";

#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseEncoder;

impl ResponseEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl<'a> Encoder<(&'a Response, bool)> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (&'a Response, bool), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (response, keep_alive) = item;

        // a handler that only wrote a body still gets a valid status line
        let status = response.status().unwrap_or(StatusCode::OK);
        match status.canonical_reason() {
            Some(reason) => {
                dst.put_slice(b"HTTP/1.1 ");
                dst.put_slice(status.as_str().as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(reason.as_bytes());
            }
            // unknown status codes fall back to 500
            None => dst.put_slice(b"HTTP/1.1 500 Internal Server Error"),
        }
        dst.put_slice(b"\r\n");

        let headers = response.headers();
        for (name, value) in headers.iter() {
            // a CR or LF inside a header would corrupt the head
            if contains_crlf(name) || contains_crlf(value) {
                return Err(SendError::invalid_response(format!(
                    "header `{}` contains a line break",
                    String::from_utf8_lossy(name)
                )));
            }
            dst.put_slice(name);
            dst.put_slice(b": ");
            dst.put_slice(value);
            dst.put_slice(b"\r\n");
        }

        if !headers.contains("content-length") && !headers.contains("transfer-encoding") {
            dst.put_slice(b"Content-Length: ");
            dst.put_slice(response.body().len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
        }
        if !headers.contains("server") {
            dst.put_slice(b"Server: ");
            dst.put_slice(SERVER_NAME);
            dst.put_slice(b"\r\n");
        }
        if !headers.contains("date") {
            dst.put_slice(b"Date: ");
            dst.put_slice(&date::http_date());
            dst.put_slice(b"\r\n");
        }
        if !keep_alive && !headers.contains("connection") {
            dst.put_slice(b"Connection: close\r\n");
        }

        dst.put_slice(b"\r\n");
        dst.put_slice(response.body());
        Ok(())
    }
}

fn contains_crlf(bytes: &[u8]) -> bool {
    bytes.iter().any(|b| *b == b'\r' || *b == b'\n')
}
