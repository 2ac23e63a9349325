//! Connection lifecycle: read, parse, dispatch, write, repeat.
//!
//! One [`Connection`] owns one socket (as split read/write halves), one
//! request decoder, one [`Context`], and two buffers drawn from the
//! thread-local pool. The async task running [`Connection::process`] *is* the
//! connection's lifetime: when the task finishes — peer close, protocol
//! error, or idle timeout — dropping the connection returns its buffers to
//! the pool and closes the socket.
//!
//! Turn-taking is strictly half-duplex: no read is issued while a dispatch or
//! write is in progress, so a second pipelined request is not parsed before
//! the previous response has been fully queued.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::buffer::{self, PooledBuffer};
use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::handler::Dispatcher;
use crate::protocol::{Context, HttpError, Message, ParseError, PayloadItem, SendError};

/// Limits and timeouts applied to a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connections idle longer than this are closed. Also bounds any single
    /// read or write.
    pub idle_timeout: Duration,
    pub max_header_bytes: usize,
    pub max_url_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            max_header_bytes: 8 * 1024,
            max_url_bytes: 2 * 1024,
            max_body_bytes: 8 * 1024,
        }
    }
}

enum ReadOutcome {
    /// A full request is in the context, ready for dispatch.
    Complete,
    /// Peer closed or the idle timer fired; nothing left to do.
    Closed,
    /// Malformed input; the connection answers 400 and closes.
    Failed(ParseError),
}

pub struct Connection<R, W> {
    reader: R,
    writer: W,
    decoder: RequestDecoder,
    encoder: ResponseEncoder,
    input: PooledBuffer,
    output: PooledBuffer,
    ctx: Context,
    config: ConnectionConfig,
    keep_alive: bool,
}

impl<R, W> fmt::Debug for Connection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("config", &self.config).field("keep_alive", &self.keep_alive).finish()
    }
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: ConnectionConfig) -> Self {
        Self {
            reader,
            writer,
            decoder: RequestDecoder::new(config.max_header_bytes, config.max_url_bytes),
            encoder: ResponseEncoder::new(),
            input: buffer::acquire(),
            output: buffer::acquire(),
            ctx: Context::new(),
            config,
            keep_alive: true,
        }
    }

    /// Runs the connection until the peer closes, a protocol error occurs,
    /// or the idle timer fires.
    pub async fn process<D>(mut self, dispatcher: Arc<D>) -> Result<(), HttpError>
    where
        D: Dispatcher + ?Sized,
    {
        loop {
            match self.read_message().await? {
                ReadOutcome::Closed => {
                    debug!("connection finished");
                    return Ok(());
                }

                ReadOutcome::Failed(e) => {
                    warn!(cause = %e, "protocol error, answering 400 and closing");
                    self.ctx.clear_response();
                    self.ctx.write(StatusCode::BAD_REQUEST, e.to_string());
                    self.keep_alive = false;
                    let _ = self.write_response().await?;
                    let _ = self.writer.shutdown().await;
                    return Ok(());
                }

                ReadOutcome::Complete => {
                    dispatcher.dispatch(&mut self.ctx);
                    if !self.write_response().await? {
                        return Ok(());
                    }
                    if !self.keep_alive {
                        let _ = self.writer.shutdown().await;
                        return Ok(());
                    }
                    self.ctx.reset();
                }
            }
        }
    }

    /// Drives the decoder until a message completes, reading more bytes
    /// whenever it reports that it needs them.
    async fn read_message(&mut self) -> Result<ReadOutcome, HttpError> {
        loop {
            loop {
                match self.decoder.decode(&mut *self.input) {
                    Ok(Some(Message::Head(head))) => {
                        self.keep_alive = head.keep_alive();
                        self.ctx.apply_head(head);
                    }
                    Ok(Some(Message::Payload(PayloadItem::Chunk(bytes)))) => {
                        if self.ctx.request().body().len() + bytes.len() > self.config.max_body_bytes {
                            return Ok(ReadOutcome::Failed(ParseError::too_large_body(self.config.max_body_bytes)));
                        }
                        self.ctx.append_request_body(&bytes);
                    }
                    Ok(Some(Message::Payload(PayloadItem::Eof))) => return Ok(ReadOutcome::Complete),
                    Ok(None) => break,
                    Err(e) => return Ok(ReadOutcome::Failed(e)),
                }
            }

            let read = timeout(self.config.idle_timeout, self.reader.read_buf(&mut *self.input)).await;
            let n = match read {
                Err(_elapsed) => {
                    debug!("idle timeout fired, closing connection");
                    return Ok(ReadOutcome::Closed);
                }
                Ok(result) => result.map_err(ParseError::io)?,
            };

            if n == 0 {
                if !self.decoder.is_idle() || !self.input.is_empty() {
                    debug!("peer closed mid-request");
                }
                return Ok(ReadOutcome::Closed);
            }
        }
    }

    /// Serializes the context's response and writes it out. Returns `false`
    /// when the idle deadline fired mid-write and the connection must close.
    async fn write_response(&mut self) -> Result<bool, HttpError> {
        self.output.clear();
        self.encoder.encode((self.ctx.response(), self.keep_alive), &mut *self.output).map_err(HttpError::from)?;

        match timeout(self.config.idle_timeout, self.writer.write_all(&self.output)).await {
            Err(_elapsed) => {
                debug!("idle timeout fired during write, closing connection");
                Ok(false)
            }
            Ok(result) => {
                result.map_err(SendError::io)?;
                self.writer.flush().await.map_err(SendError::io)?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::dispatcher_fn;
    use tokio::io::{DuplexStream, duplex, split};

    fn spawn_connection(
        config: ConnectionConfig,
        dispatch: impl Fn(&mut Context) + Send + Sync + 'static,
    ) -> DuplexStream {
        let (client, server) = duplex(16 * 1024);
        let (reader, writer) = split(server);
        let connection = Connection::new(reader, writer, config);
        let dispatcher = Arc::new(dispatcher_fn(dispatch));
        tokio::spawn(async move {
            let _ = connection.process(dispatcher).await;
        });
        client
    }

    fn echo_path(ctx: &mut Context) {
        let path = ctx.path().to_owned();
        ctx.write(StatusCode::OK, path);
    }

    /// Reads one full response: head plus a Content-Length framed body.
    async fn read_response(client: &mut DuplexStream) -> String {
        let mut collected = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let head_end = collected.windows(4).position(|w| w == b"\r\n\r\n");
            if let Some(at) = head_end {
                let head = String::from_utf8(collected[..at].to_vec()).unwrap();
                let content_length: usize = head
                    .lines()
                    .find_map(|line| line.strip_prefix("Content-Length: "))
                    .map(|v| v.parse().unwrap())
                    .unwrap_or(0);
                let body_start = at + 4;
                while collected.len() < body_start + content_length {
                    let n = client.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "eof before full body");
                    collected.extend_from_slice(&chunk[..n]);
                }
                return String::from_utf8(collected).unwrap();
            }
            let n = client.read(&mut chunk).await.unwrap();
            assert!(n > 0, "eof before full head");
            collected.extend_from_slice(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn serves_a_simple_request() {
        let mut client = spawn_connection(ConnectionConfig::default(), echo_path);

        client.write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let response = read_response(&mut client).await;

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "got {response:?}");
        assert!(response.contains("Content-Length: 6\r\n"));
        assert!(response.contains("Server: arbor\r\n"));
        assert!(response.contains("Date: "));
        assert!(response.ends_with("\r\n\r\n/hello"));
    }

    #[tokio::test]
    async fn keep_alive_serves_sequential_requests() {
        let mut client = spawn_connection(ConnectionConfig::default(), echo_path);

        client.write_all(b"GET /one HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let first = read_response(&mut client).await;
        assert!(first.ends_with("/one"));
        assert!(!first.contains("Connection: close"));

        client.write_all(b"GET /two HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        let second = read_response(&mut client).await;
        assert!(second.ends_with("/two"));
    }

    #[tokio::test]
    async fn connection_close_is_honored() {
        let mut client = spawn_connection(ConnectionConfig::default(), echo_path);

        client.write_all(b"GET /bye HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await.unwrap();
        let response = read_response(&mut client).await;
        assert!(response.contains("Connection: close\r\n"));

        // server must close after flushing the response
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn http10_defaults_to_close() {
        let mut client = spawn_connection(ConnectionConfig::default(), echo_path);

        client.write_all(b"GET / HTTP/1.0\r\nHost: x\r\n\r\n").await.unwrap();
        let response = read_response(&mut client).await;
        assert!(response.contains("Connection: close\r\n"));

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn request_body_reaches_the_dispatcher() {
        let mut client = spawn_connection(ConnectionConfig::default(), |ctx| {
            let body = ctx.request().body().to_vec();
            ctx.write(StatusCode::OK, body);
        });

        client.write_all(b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 11\r\n\r\nhello world").await.unwrap();
        let response = read_response(&mut client).await;
        assert!(response.ends_with("hello world"));
    }

    #[tokio::test]
    async fn chunked_body_is_reassembled() {
        let mut client = spawn_connection(ConnectionConfig::default(), |ctx| {
            let body = ctx.request().body().to_vec();
            ctx.write(StatusCode::OK, body);
        });

        client
            .write_all(b"POST /echo HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n")
            .await
            .unwrap();
        let response = read_response(&mut client).await;
        assert!(response.ends_with("Wikipedia"));
    }

    #[tokio::test]
    async fn malformed_request_yields_400_and_close() {
        let mut client = spawn_connection(ConnectionConfig::default(), echo_path);

        client.write_all(b"NOT-AN-HTTP-REQUEST\r\n\r\n").await.unwrap();
        let response = read_response(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "got {response:?}");
        assert!(response.contains("Connection: close\r\n"));

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_yields_400() {
        let config = ConnectionConfig { max_body_bytes: 8, ..ConnectionConfig::default() };
        let mut client = spawn_connection(config, echo_path);

        client.write_all(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 32\r\n\r\n0123456789abcdef0123456789abcdef").await.unwrap();
        let response = read_response(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn idle_connection_is_closed_by_the_timer() {
        let config = ConnectionConfig { idle_timeout: Duration::from_millis(50), ..ConnectionConfig::default() };
        let mut client = spawn_connection(config, echo_path);

        // no request at all: the server must hang up on its own
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn head_split_across_writes_still_parses() {
        let mut client = spawn_connection(ConnectionConfig::default(), echo_path);

        client.write_all(b"GET /spl").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.write_all(b"it HTTP/1.1\r\nHo").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.write_all(b"st: x\r\n\r\n").await.unwrap();

        let response = read_response(&mut client).await;
        assert!(response.ends_with("/split"));
    }
}
