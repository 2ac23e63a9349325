//! An asynchronous micro HTTP/1.1 server engine
//!
//! This crate provides the protocol layer of the arbor server: incremental
//! request parsing, response serialization, per-connection lifecycle
//! management, and thread-local buffer pooling. It is built on tokio and
//! httparse and deliberately knows nothing about routing; dispatching a
//! parsed request to application code happens behind the [`handler::Dispatcher`]
//! trait, which the companion `arbor-web` crate implements with its router.
//!
//! # Features
//!
//! - Full HTTP/1.1 request parsing, split-tolerant across reads
//! - Fixed-length and chunked request bodies
//! - Keep-alive connections with an idle timer
//! - Thread-local buffer pooling for read and write buffers
//! - A cached `Date` header value, refreshed at most once per second
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use http::StatusCode;
//! use tokio::io::split;
//! use tokio::net::TcpListener;
//! use arbor_http::connection::{Connection, ConnectionConfig};
//! use arbor_http::handler::dispatcher_fn;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> std::io::Result<()> {
//!     let dispatcher = Arc::new(dispatcher_fn(|ctx| {
//!         let path = ctx.path().to_owned();
//!         ctx.write(StatusCode::OK, format!("hello from {path}"));
//!     }));
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let local = tokio::task::LocalSet::new();
//!     local
//!         .run_until(async move {
//!             loop {
//!                 let (stream, _) = listener.accept().await?;
//!                 let (reader, writer) = split(stream);
//!                 let connection = Connection::new(reader, writer, ConnectionConfig::default());
//!                 let dispatcher = Arc::clone(&dispatcher);
//!                 tokio::task::spawn_local(async move {
//!                     let _ = connection.process(dispatcher).await;
//!                 });
//!             }
//!         })
//!         .await
//! }
//! ```

pub mod buffer;
pub mod codec;
pub mod connection;
pub mod date;
pub mod handler;
pub mod protocol;
pub(crate) mod utils;
