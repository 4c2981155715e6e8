//! HTTP implementations of the transport traits.

use crate::error::{SyncError, SyncResult};
use crate::transport::{Discovery, PeerAddr, PeerTransport};
use std::time::Duration;
use syncdb_sync_protocol::{
    decode_bundles, decode_ids, decode_peers, DiffMessage, DiscoveryRequest, PeerMap,
    TransactionBundle, DIFFS_PATH, TRANSACTIONS_PATH,
};
use tracing::debug;

fn client(timeout: Duration) -> SyncResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {e}")))
}

async fn body(response: reqwest::Response) -> SyncResult<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Transport {
            message: format!("{} returned {status}", response.url()),
            retryable: status.is_server_error(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}

/// Peer transport over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    /// Creates a transport whose calls time out after `timeout`.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        Ok(Self {
            client: client(timeout)?,
        })
    }
}

impl PeerTransport for HttpPeerTransport {
    async fn list_transactions(&self, peer: &PeerAddr) -> SyncResult<Vec<String>> {
        let url = format!("{}{TRANSACTIONS_PATH}", peer.base_url());
        debug!(%url, "listing peer transactions");
        let response = self.client.get(&url).send().await?;
        Ok(decode_ids(&body(response).await?)?)
    }

    async fn exchange(
        &self,
        peer: &PeerAddr,
        message: &DiffMessage,
    ) -> SyncResult<Vec<TransactionBundle>> {
        let url = format!("{}{DIFFS_PATH}", peer.base_url());
        debug!(%url, have = message.have.len(), want = message.want.len(), "sending diff");
        let response = self.client.post(&url).json(message).send().await?;
        Ok(decode_bundles(&body(response).await?)?)
    }
}

/// Client for the HTTP discovery service.
///
/// Issues `GET <base>/?i=<ips>&c=<company>&p=<port>&id=<node id>` and expects
/// a JSON object mapping node ids to [`NodeInfo`](syncdb_sync_protocol::NodeInfo).
#[derive(Debug, Clone)]
pub struct HttpDiscovery {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDiscovery {
    /// Creates a discovery client for `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: client(timeout)?,
        })
    }

    /// Returns the service URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Discovery for HttpDiscovery {
    async fn discover(&self, request: &DiscoveryRequest) -> SyncResult<PeerMap> {
        let url = format!("{}/", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&request.query_pairs())
            .send()
            .await
            .map_err(|e| SyncError::Discovery(e.to_string()))?;
        let bytes = body(response)
            .await
            .map_err(|e| SyncError::Discovery(e.to_string()))?;
        decode_peers(&bytes).map_err(|e| SyncError::Discovery(e.to_string()))
    }
}
