//! Server configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Configuration for the sync listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. The port is always chosen by the OS.
    pub bind_ip: IpAddr,
    /// Pause before rebinding after the listener fails or exits.
    pub restart_backoff: Duration,
    /// Largest accepted `POST /diffs` body.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Creates a configuration binding to `bind_ip`.
    pub fn new(bind_ip: IpAddr) -> Self {
        Self {
            bind_ip,
            restart_backoff: Duration::from_secs(1),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }

    /// Creates a configuration bound to the loopback interface.
    pub fn localhost() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    /// Sets the restart backoff.
    pub fn with_restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }

    /// Sets the maximum request body size.
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}
