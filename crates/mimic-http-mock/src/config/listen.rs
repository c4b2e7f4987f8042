//! Listener configuration for the playback and admin servers.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Playback listener (the port mocked clients talk to).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

/// Admin API listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_admin_port() -> u16 {
    9090
}

fn default_true() -> bool {
    true
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_listen_port(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_admin_port(),
        }
    }
}

impl ListenConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        parse_addr(&self.host, self.port)
    }
}

impl AdminConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        parse_addr(&self.host, self.port)
    }
}

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr, anyhow::Error> {
    format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen address '{host}:{port}': {e}"))
}
