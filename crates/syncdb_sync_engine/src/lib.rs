//! # SyncDB Sync Engine
//!
//! Sync rounds between SyncDB replicas.
//!
//! This crate provides:
//! - The round state machine (idle → resolving identity → discovering
//!   peers → exchanging → idle)
//! - Id-set diffing, bundle exchange and replay per peer
//! - HTTP clients for the discovery service and peer listeners
//! - Local IPv4 address enumeration
//! - A hook for script payloads delivered through discovery
//!
//! ## Round
//!
//! 1. Read the local `company` and `id` settings; abort if either is missing
//! 2. Announce addresses, company, listener port and node id to discovery
//! 3. For every other node and each of its non-loopback addresses: list
//!    the peer's ids, send the bundles it lacks together with the ids we
//!    lack, replay what comes back
//!
//! A failing peer never aborts the round.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod addrs;
mod config;
mod error;
mod http;
mod script;
mod state;
mod transport;

pub use addrs::local_ipv4_addresses;
pub use config::{SyncConfig, DEFAULT_DISCOVERY_URL};
pub use error::{SyncError, SyncResult};
pub use http::{HttpDiscovery, HttpPeerTransport};
pub use script::{ScriptError, ScriptEvaluator};
pub use state::{
    NodeIdentity, PeerExchange, PeerFailure, SyncEngine, SyncRoundResult, SyncState, SyncStats,
};
pub use transport::{Discovery, PeerAddr, PeerTransport, StaticDiscovery};

/// Engine wired to the HTTP discovery service and HTTP peers.
pub type HttpSyncEngine = SyncEngine<HttpDiscovery, HttpPeerTransport>;

impl HttpSyncEngine {
    /// Creates an engine using `config.discovery_url` and
    /// `config.request_timeout`.
    pub fn http(
        config: SyncConfig,
        store: std::sync::Arc<syncdb_core::Store>,
        port: syncdb_sync_protocol::ListenerPort,
    ) -> SyncResult<Self> {
        let discovery = HttpDiscovery::new(config.discovery_url.clone(), config.request_timeout)?;
        let transport = HttpPeerTransport::new(config.request_timeout)?;
        Ok(SyncEngine::new(config, store, port, discovery, transport))
    }
}
