//! Transport abstractions for sync rounds.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use syncdb_sync_protocol::{DiffMessage, DiscoveryRequest, PeerMap, TransactionBundle};

/// Network location of a peer's sync listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    /// Host name or IP address.
    pub host: String,
    /// Listener port, as reported by discovery.
    pub port: String,
}

impl PeerAddr {
    /// Creates a peer address.
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }

    /// Returns `http://host:port`.
    pub fn base_url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Client side of the peer endpoints.
pub trait PeerTransport: Send + Sync + 'static {
    /// Fetches every transaction id the peer knows.
    fn list_transactions(
        &self,
        peer: &PeerAddr,
    ) -> impl Future<Output = SyncResult<Vec<String>>> + Send;

    /// Sends a diff message and returns the bundles the peer supplied.
    fn exchange(
        &self,
        peer: &PeerAddr,
        message: &DiffMessage,
    ) -> impl Future<Output = SyncResult<Vec<TransactionBundle>>> + Send;
}

/// Maps a company to the nodes registered for it.
pub trait Discovery: Send + Sync + 'static {
    /// Announces this node and returns every registered node.
    fn discover(
        &self,
        request: &DiscoveryRequest,
    ) -> impl Future<Output = SyncResult<PeerMap>> + Send;
}

/// Discovery backed by a fixed peer map.
///
/// Records every request it receives.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    peers: Mutex<PeerMap>,
    requests: Mutex<Vec<DiscoveryRequest>>,
    failure: Mutex<Option<String>>,
}

impl StaticDiscovery {
    /// Creates a discovery answering with `peers`.
    pub fn new(peers: PeerMap) -> Self {
        Self {
            peers: Mutex::new(peers),
            ..Self::default()
        }
    }

    /// Replaces the peer map.
    pub fn set_peers(&self, peers: PeerMap) {
        *self.peers.lock() = peers;
    }

    /// Makes every later call fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Returns the requests received so far.
    pub fn requests(&self) -> Vec<DiscoveryRequest> {
        self.requests.lock().clone()
    }
}

impl Discovery for StaticDiscovery {
    fn discover(
        &self,
        request: &DiscoveryRequest,
    ) -> impl Future<Output = SyncResult<PeerMap>> + Send {
        self.requests.lock().push(request.clone());
        let result = match self.failure.lock().clone() {
            Some(message) => Err(SyncError::Discovery(message)),
            None => Ok(self.peers.lock().clone()),
        };
        std::future::ready(result)
    }
}
