//! Server configuration: builder-style setters plus JSON loading.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::thread;
use std::time::Duration;

use arbor_http::connection::ConnectionConfig;
use serde::Deserialize;

use crate::ServerError;

fn default_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_max_header_bytes() -> usize {
    8 * 1024
}

fn default_max_url_bytes() -> usize {
    2 * 1024
}

fn default_max_body_bytes() -> usize {
    8 * 1024
}

fn default_buffer_chunk_bytes() -> usize {
    8 * 1024
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_ip")]
    pub ip: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads, each running its own event loop.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,

    #[serde(default = "default_max_url_bytes")]
    pub max_url_bytes: usize,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Capacity of the buffers handed out by each worker's pool.
    #[serde(default = "default_buffer_chunk_bytes")]
    pub buffer_chunk_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            workers: default_workers(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_header_bytes: default_max_header_bytes(),
            max_url_bytes: default_max_url_bytes(),
            max_body_bytes: default_max_body_bytes(),
            buffer_chunk_bytes: default_buffer_chunk_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub(crate) fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_header_bytes: self.max_header_bytes,
            max_url_bytes: self.max_url_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn defaults_match_the_documented_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.idle_timeout_secs, 60);
        assert_eq!(config.max_header_bytes, 8 * 1024);
        assert_eq!(config.max_url_bytes, 2 * 1024);
        assert_eq!(config.max_body_bytes, 8 * 1024);
        assert_eq!(config.buffer_chunk_bytes, 8 * 1024);
        assert!(config.workers >= 1);
    }

    #[test]
    fn json_overrides_selected_fields() {
        let text = indoc! {r#"
            {
                "port": 9090,
                "workers": 2,
                "idle_timeout_secs": 5
            }
        "#};
        let config: ServerConfig = serde_json::from_str(text).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.workers, 2);
        assert_eq!(config.idle_timeout_secs, 5);
        // untouched fields fall back to defaults
        assert_eq!(config.max_body_bytes, 8 * 1024);
    }

    #[test]
    fn unknown_json_fields_are_rejected() {
        let result: Result<ServerConfig, _> = serde_json::from_str(r#"{"prot": 1}"#);
        assert!(result.is_err());
    }
}
