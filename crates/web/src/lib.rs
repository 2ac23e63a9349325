//! A small routing and serving layer on top of `arbor-http`
//!
//! This crate adds what the protocol engine deliberately leaves out: a
//! per-method routing trie with typed path segments, before/after aspects
//! around handlers with a process-wide exception handler, a JSON-loadable
//! server configuration, and a multi-threaded accept loop where each worker
//! runs its own single-threaded event loop.
//!
//! # Example
//!
//! ```no_run
//! use http::{Method, StatusCode};
//! use arbor_web::{Router, Server, ServerConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::builder()
//!         .route(
//!             Method::GET,
//!             "/sum/{int}/{int}",
//!             |ctx| {
//!                 let a: i64 = ctx.path_param(0).ok_or("missing operand")?;
//!                 let b: i64 = ctx.path_param(1).ok_or("missing operand")?;
//!                 ctx.write(StatusCode::OK, (a + b).to_string());
//!                 Ok(())
//!             },
//!             vec![],
//!         )?
//!         .build();
//!
//!     let server = Server::builder()
//!         .config(ServerConfig::default().port(8080))
//!         .router(router)
//!         .build()?;
//!     server.bind()?.run()?;
//!     Ok(())
//! }
//! ```

mod config;
mod server;

pub mod aspect;
pub mod router;
pub mod trie;

pub use aspect::{Aspect, Hook};
pub use config::ServerConfig;
pub use router::{BoxError, Router, RouterBuilder, RouterError};
pub use server::{BoundServer, Server, ServerBuilder, ServerError};
