//! TCP listener and the worker pool behind it.
//!
//! The server runs one accept loop on the calling thread and `workers`
//! dedicated threads, each with its own single-threaded tokio runtime and
//! `LocalSet`. Accepted sockets are handed out round-robin over per-worker
//! channels and served with `spawn_local`, so a connection — and with it the
//! thread-local buffer pool its buffers came from — never migrates between
//! threads.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use arbor_http::buffer;
use arbor_http::connection::{Connection, ConnectionConfig};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{Level, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::router::Router;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("router must be set")]
    MissingRouter,

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct ServerBuilder {
    config: ServerConfig,
    router: Option<Router>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { config: ServerConfig::default(), router: None }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let router = self.router.ok_or(ServerError::MissingRouter)?;
        Ok(Server { config: self.config, router: Arc::new(router) })
    }
}

#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the listener. Separate from [`BoundServer::run`] so callers can
    /// learn the actual address when binding port 0.
    pub fn bind(self) -> Result<BoundServer, ServerError> {
        let listener = std::net::TcpListener::bind(self.config.address())?;
        let local_addr = listener.local_addr()?;
        Ok(BoundServer { listener, local_addr, config: self.config, router: self.router })
    }
}

#[derive(Debug)]
pub struct BoundServer {
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    router: Arc<Router>,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the workers and blocks the calling thread on the accept loop.
    pub fn run(self) -> Result<(), ServerError> {
        let _ = tracing_subscriber::fmt().with_max_level(Level::INFO).try_init();

        info!(workers = self.config.workers, "listening at {}", self.local_addr);
        for (method, pattern) in self.router.listing() {
            info!("route registered: {method} {pattern}");
        }

        let mut senders = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers.max(1) {
            let (tx, rx) = mpsc::unbounded_channel();
            let router = Arc::clone(&self.router);
            let connection_config = self.config.connection_config();
            let chunk_size = self.config.buffer_chunk_bytes;
            thread::Builder::new()
                .name(format!("arbor-worker-{id}"))
                .spawn(move || worker_loop(rx, router, connection_config, chunk_size))?;
            senders.push(tx);
        }

        let mut next = 0;
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                trace!(cause = %e, "could not set TCP_NODELAY");
            }
            if let Err(e) = stream.set_nonblocking(true) {
                warn!(cause = %e, "could not make socket non-blocking, dropping it");
                continue;
            }

            trace!(%peer, worker = next, "accepted connection");
            if senders[next].send(stream).is_err() {
                error!(worker = next, "worker channel closed, dropping connection");
            }
            next = (next + 1) % senders.len();
        }
    }
}

/// One worker thread: a current-thread runtime draining its channel and
/// serving every assigned connection on this thread via `spawn_local`.
fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<std::net::TcpStream>,
    router: Arc<Router>,
    connection_config: ConnectionConfig,
    chunk_size: usize,
) {
    buffer::configure(chunk_size);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(cause = %e, "failed to build worker runtime");
            return;
        }
    };

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async move {
        while let Some(stream) = rx.recv().await {
            let stream = match tokio::net::TcpStream::from_std(stream) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(cause = %e, "failed to register socket with the reactor");
                    continue;
                }
            };

            let (reader, writer) = stream.into_split();
            let connection = Connection::new(reader, writer, connection_config.clone());
            let router = Arc::clone(&router);
            tokio::task::spawn_local(async move {
                if let Err(e) = connection.process(router).await {
                    warn!(cause = %e, "connection ended with an error");
                }
            });
        }
    });
}
