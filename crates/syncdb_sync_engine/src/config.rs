//! Sync engine configuration.

use std::time::Duration;

/// Default discovery service.
pub const DEFAULT_DISCOVERY_URL: &str = "https://piscine-monsieur-96181.herokuapp.com";

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the discovery service.
    pub discovery_url: String,
    /// Timeout for every outbound HTTP call.
    pub request_timeout: Duration,
    /// Dial loopback addresses reported by discovery.
    pub include_loopback: bool,
    /// Pause between rounds when running periodically.
    pub sync_interval: Duration,
}

impl SyncConfig {
    /// Creates a configuration for the given discovery service.
    pub fn new(discovery_url: impl Into<String>) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            request_timeout: Duration::from_secs(30),
            include_loopback: false,
            sync_interval: Duration::from_secs(300),
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets whether loopback addresses are dialed.
    pub fn with_loopback(mut self, include: bool) -> Self {
        self.include_loopback = include;
        self
    }

    /// Sets the interval between periodic rounds.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_URL)
    }
}
