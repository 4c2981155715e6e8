//! Sync engine state machine.

use crate::addrs::local_ipv4_addresses;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::script::ScriptEvaluator;
use crate::transport::{Discovery, PeerAddr, PeerTransport};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use syncdb_core::{CoreError, CoreResult, ReplaySummary, Store, COMPANY_KEY, NODE_ID_KEY};
use syncdb_sync_protocol::{
    from_wire, is_loopback, to_wire, DiffMessage, DiscoveryRequest, IdDiff, ListenerPort,
    NodeInfo,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Reading the company and node id settings.
    ResolvingIdentity,
    /// Asking the discovery service for peers.
    DiscoveringPeers,
    /// Exchanging transactions with a peer.
    Exchanging,
}

impl SyncState {
    /// Returns true if a round is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }

    /// Returns true if the engine can start a new round.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle)
    }
}

/// Statistics about sync rounds.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Rounds that got past discovery.
    pub rounds_completed: u64,
    /// Rounds aborted by an error.
    pub rounds_failed: u64,
    /// Successful peer exchanges.
    pub peers_synced: u64,
    /// Peer exchanges that failed.
    pub peers_failed: u64,
    /// Bundles offered to peers.
    pub bundles_sent: u64,
    /// Bundles received from peers, including ones dropped as unreadable.
    pub bundles_received: u64,
    /// Received bundles applied completely.
    pub bundles_applied: u64,
    /// Received bundles applied up to a failing statement.
    pub bundles_partial: u64,
    /// Received bundles already present locally.
    pub bundles_skipped: u64,
    /// End of the last round.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// The node identity used for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Company (replica group) id.
    pub company: String,
    /// Node id.
    pub node_id: String,
}

/// Outcome of one exchange with one peer address.
#[derive(Debug, Clone)]
pub struct PeerExchange {
    /// Discovered node id.
    pub node_id: String,
    /// Address that was dialed.
    pub peer: PeerAddr,
    /// Bundles offered to the peer.
    pub sent: usize,
    /// Ids requested from the peer.
    pub requested: usize,
    /// Bundles the peer returned, readable or not.
    pub received: usize,
    /// What happened to the bundles the peer returned.
    pub replay: ReplaySummary,
}

/// A peer address whose exchange failed.
#[derive(Debug, Clone)]
pub struct PeerFailure {
    /// Discovered node id.
    pub node_id: String,
    /// Address that was dialed.
    pub peer: PeerAddr,
    /// The error, as text.
    pub error: String,
}

/// Result of a sync round.
#[derive(Debug, Clone)]
pub struct SyncRoundResult {
    /// Identity used for the round.
    pub identity: NodeIdentity,
    /// Nodes returned by discovery, this node included.
    pub discovered: usize,
    /// Successful exchanges.
    pub exchanges: Vec<PeerExchange>,
    /// Failed exchanges.
    pub failures: Vec<PeerFailure>,
    /// Whether a script payload was evaluated successfully.
    pub script_evaluated: bool,
    /// Duration of the round.
    pub duration: Duration,
}

impl SyncRoundResult {
    /// Total bundles applied (fully or partially) during the round.
    pub fn bundles_applied(&self) -> usize {
        self.exchanges
            .iter()
            .map(|e| e.replay.applied + e.replay.partial)
            .sum()
    }
}

/// Runs sync rounds for one store.
///
/// A round resolves the node identity, asks discovery for the company's
/// nodes and exchanges transactions with every other node. A failing peer
/// is logged and skipped; each received transaction is replayed in its own
/// local transaction, so work done before a failure is kept.
pub struct SyncEngine<D: Discovery, T: PeerTransport> {
    config: SyncConfig,
    store: Arc<Store>,
    port: ListenerPort,
    discovery: Arc<D>,
    transport: Arc<T>,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
    local_addresses: Option<Vec<String>>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<D: Discovery, T: PeerTransport> SyncEngine<D, T> {
    /// Creates a new sync engine.
    ///
    /// `port` must be the slot the store's listener publishes into.
    pub fn new(
        config: SyncConfig,
        store: Arc<Store>,
        port: ListenerPort,
        discovery: D,
        transport: T,
    ) -> Self {
        Self {
            config,
            store,
            port,
            discovery: Arc::new(discovery),
            transport: Arc::new(transport),
            evaluator: None,
            local_addresses: None,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Installs a script evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Announces `addresses` instead of the enumerated interface addresses.
    pub fn with_local_addresses(mut self, addresses: Vec<String>) -> Self {
        self.local_addresses = Some(addresses);
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the discovery client.
    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    /// Returns the store being synced.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Performs one sync round.
    ///
    /// Fails only if the identity cannot be resolved, local addresses cannot
    /// be listed or discovery fails. Peer failures are reported in the
    /// result.
    pub async fn sync(&self) -> SyncResult<SyncRoundResult> {
        {
            let mut state = self.state.write();
            if !state.can_start_sync() {
                return Err(SyncError::InvalidStateTransition {
                    from: format!("{:?}", *state),
                    to: "ResolvingIdentity".into(),
                });
            }
            *state = SyncState::ResolvingIdentity;
        }

        let idle = IdleOnDrop(&self.state);
        let start = Instant::now();
        let result = self.run_round(start).await;
        drop(idle);

        let mut stats = self.stats.write();
        stats.last_sync_time = Some(Instant::now());
        match &result {
            Ok(round) => {
                stats.rounds_completed += 1;
                stats.peers_synced += round.exchanges.len() as u64;
                stats.peers_failed += round.failures.len() as u64;
                for exchange in &round.exchanges {
                    stats.bundles_sent += exchange.sent as u64;
                    stats.bundles_received += exchange.received as u64;
                    stats.bundles_applied += exchange.replay.applied as u64;
                    stats.bundles_partial += exchange.replay.partial as u64;
                    stats.bundles_skipped += exchange.replay.skipped as u64;
                }
                stats.last_error = round.failures.last().map(|f| f.error.clone());
            }
            Err(e) => {
                stats.rounds_failed += 1;
                stats.last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn run_round(&self, start: Instant) -> SyncResult<SyncRoundResult> {
        info!("sync round started");
        let identity = self.resolve_identity().await?;
        debug!(company = %identity.company, node_id = %identity.node_id, "identity resolved");

        self.set_state(SyncState::DiscoveringPeers);
        let my_ips = match &self.local_addresses {
            Some(addresses) => addresses.clone(),
            None => local_ipv4_addresses()?,
        };
        let my_port = match self.port.get() {
            Some(port) => port.to_string(),
            None => {
                warn!("sync listener is not bound, announcing port 0");
                "0".to_string()
            }
        };
        let request = DiscoveryRequest {
            my_ips,
            company: identity.company.clone(),
            my_port,
            my_node_id: identity.node_id.clone(),
        };
        let nodes = self.discovery.discover(&request).await?;
        info!(nodes = nodes.len(), "peers discovered");

        let mut round = SyncRoundResult {
            identity,
            discovered: nodes.len(),
            exchanges: Vec::new(),
            failures: Vec::new(),
            script_evaluated: false,
            duration: Duration::ZERO,
        };

        for (node_id, info) in &nodes {
            if *node_id == round.identity.node_id {
                round.script_evaluated = self.evaluate_script(info);
                continue;
            }

            let addresses: Vec<&str> = info
                .addresses()
                .into_iter()
                .filter(|addr| self.config.include_loopback || !is_loopback(addr))
                .collect();
            if addresses.is_empty() {
                debug!(%node_id, "no dialable address for peer");
                continue;
            }

            for addr in addresses {
                let peer = PeerAddr::new(addr, info.port.clone());
                self.set_state(SyncState::Exchanging);
                match self.exchange_with(&peer).await {
                    Ok((sent, requested, received, replay)) => {
                        info!(
                            %node_id,
                            %peer,
                            sent,
                            requested,
                            received,
                            applied = replay.applied,
                            skipped = replay.skipped,
                            "synced with peer"
                        );
                        round.exchanges.push(PeerExchange {
                            node_id: node_id.clone(),
                            peer,
                            sent,
                            requested,
                            received,
                            replay,
                        });
                    }
                    Err(e) => {
                        warn!(%node_id, %peer, error = %e, "sync with peer failed, skipping");
                        round.failures.push(PeerFailure {
                            node_id: node_id.clone(),
                            peer,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        round.duration = start.elapsed();
        info!(
            exchanges = round.exchanges.len(),
            failures = round.failures.len(),
            duration_ms = round.duration.as_millis() as u64,
            "sync round finished"
        );
        Ok(round)
    }

    /// Reads the company and node id in a read-write transaction.
    async fn resolve_identity(&self) -> SyncResult<NodeIdentity> {
        self.with_store(|store| {
            let tx = store.begin()?;
            let company = tx.get(COMPANY_KEY);
            let node_id = tx.get(NODE_ID_KEY);
            tx.commit()?;
            Ok((company, node_id))
        })
        .await
        .and_then(|(company, node_id)| {
            Ok(NodeIdentity {
                company: identity_setting(company)?,
                node_id: identity_setting(node_id)?,
            })
        })
    }

    /// Returns bundles sent, ids requested, bundles received and what
    /// replaying them did.
    async fn exchange_with(
        &self,
        peer: &PeerAddr,
    ) -> SyncResult<(usize, usize, usize, ReplaySummary)> {
        let remote = self.transport.list_transactions(peer).await?;
        let local = self.with_store(|store| store.transaction_ids()).await?;
        let diff = IdDiff::compute(&local, &remote);
        if diff.is_empty() {
            debug!(%peer, "peer already in sync");
            return Ok((0, 0, 0, ReplaySummary::default()));
        }

        let only_local = diff.only_local;
        let have = self.with_store(move |store| store.bundles(&only_local)).await?;
        let message = DiffMessage::new(to_wire(&have), diff.only_remote);
        let requested = message.want.len();

        let received = self.transport.exchange(peer, &message).await?;
        let received_count = received.len();
        let bundles = from_wire(received);
        let replay = self
            .with_store(move |store| Ok(store.replay_all(&bundles)))
            .await?;
        Ok((have.len(), requested, received_count, replay))
    }

    fn evaluate_script(&self, own: &NodeInfo) -> bool {
        let (Some(evaluator), Some(script)) = (&self.evaluator, own.script()) else {
            return false;
        };
        match evaluator.evaluate(script) {
            Ok(()) => {
                info!("script payload evaluated");
                true
            }
            Err(e) => {
                warn!(error = %e, "script payload failed");
                false
            }
        }
    }

    /// Runs a blocking store operation off the async runtime.
    async fn with_store<R, F>(&self, f: F) -> SyncResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Store) -> CoreResult<R> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| SyncError::Internal(format!("store task failed: {e}")))?
            .map_err(SyncError::from)
    }

    /// Runs a round every [`sync_interval`](SyncConfig::sync_interval) until
    /// `shutdown` turns true. Round errors are logged.
    pub async fn run_periodic(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if let Err(e) = self.sync().await {
                warn!(error = %e, "sync round failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.sync_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("periodic sync stopped");
    }
}

/// Puts the engine back to idle when a round ends, including when the round
/// future is dropped before completing.
struct IdleOnDrop<'a>(&'a RwLock<SyncState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.write() = SyncState::Idle;
    }
}

fn identity_setting(value: CoreResult<String>) -> SyncResult<String> {
    match value {
        Ok(v) => Ok(v),
        Err(CoreError::KeyNotFound { key }) => Err(SyncError::IdentityUnresolved { key }),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StaticDiscovery;
    use syncdb_core::StoreConfig;
    use syncdb_sync_protocol::{PeerMap, TransactionBundle};

    /// Transport that must never be called.
    struct NoTransport;

    impl PeerTransport for NoTransport {
        async fn list_transactions(&self, peer: &PeerAddr) -> SyncResult<Vec<String>> {
            Err(SyncError::transport_fatal(format!("unexpected dial to {peer}")))
        }

        async fn exchange(
            &self,
            peer: &PeerAddr,
            _message: &DiffMessage,
        ) -> SyncResult<Vec<TransactionBundle>> {
            Err(SyncError::transport_fatal(format!("unexpected dial to {peer}")))
        }
    }

    fn store_with_identity(company: Option<&str>, node: Option<&str>) -> Arc<Store> {
        let store = Store::open(StoreConfig::in_memory().generate_node_id(false)).unwrap();
        store
            .transaction(|tx| {
                if let Some(c) = company {
                    tx.set(COMPANY_KEY, c)?;
                }
                if let Some(n) = node {
                    tx.set(NODE_ID_KEY, n)?;
                }
                Ok(())
            })
            .unwrap();
        Arc::new(store)
    }

    fn engine(store: Arc<Store>, peers: PeerMap) -> SyncEngine<StaticDiscovery, NoTransport> {
        SyncEngine::new(
            SyncConfig::default(),
            store,
            ListenerPort::new(),
            StaticDiscovery::new(peers),
            NoTransport,
        )
        .with_local_addresses(vec!["10.0.0.1".into()])
    }

    #[tokio::test]
    async fn missing_company_aborts_round() {
        let engine = engine(store_with_identity(None, Some("n1")), PeerMap::new());
        let err = engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::IdentityUnresolved { ref key } if key == "company"));
        assert!(engine.discovery().requests().is_empty());
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().rounds_failed, 1);
    }

    #[tokio::test]
    async fn missing_node_id_aborts_round() {
        let engine = engine(store_with_identity(Some("acme"), None), PeerMap::new());
        let err = engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::IdentityUnresolved { ref key } if key == "id"));
    }

    #[tokio::test]
    async fn announces_identity_and_port() {
        let store = store_with_identity(Some("acme"), Some("n1"));
        let engine = engine(store, PeerMap::new());
        engine.port.publish(4321);

        let round = engine.sync().await.unwrap();
        assert_eq!(round.discovered, 0);
        assert_eq!(
            engine.discovery().requests(),
            vec![DiscoveryRequest {
                my_ips: vec!["10.0.0.1".into()],
                company: "acme".into(),
                my_port: "4321".into(),
                my_node_id: "n1".into(),
            }]
        );
        assert_eq!(engine.stats().rounds_completed, 1);
    }

    #[tokio::test]
    async fn self_entry_is_never_dialed_and_loopback_is_skipped() {
        let mut peers = PeerMap::new();
        peers.insert("n1".into(), NodeInfo::new("10.0.0.1", 1));
        peers.insert("n2".into(), NodeInfo::new("127.0.0.1", 2));
        let engine = engine(store_with_identity(Some("acme"), Some("n1")), peers);

        let round = engine.sync().await.unwrap();
        assert!(round.exchanges.is_empty());
        assert!(round.failures.is_empty());
    }

    #[tokio::test]
    async fn failing_peer_is_skipped() {
        let mut peers = PeerMap::new();
        peers.insert("n2".into(), NodeInfo::new("10.0.0.2,10.0.0.3", 2));
        let engine = engine(store_with_identity(Some("acme"), Some("n1")), peers);

        let round = engine.sync().await.unwrap();
        assert_eq!(round.failures.len(), 2);
        assert_eq!(engine.stats().peers_failed, 2);
        assert!(engine.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn script_payload_goes_to_evaluator() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let evaluator = move |payload: &str| -> Result<(), crate::ScriptError> {
            assert_eq!(payload, "(print 1)");
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        let mut peers = PeerMap::new();
        let mut own = NodeInfo::new("10.0.0.1", 1);
        own.script_payload = Some("(print 1)".into());
        peers.insert("n1".into(), own);

        let engine = engine(store_with_identity(Some("acme"), Some("n1")), peers)
            .with_evaluator(Arc::new(evaluator));
        let round = engine.sync().await.unwrap();
        assert!(round.script_evaluated);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_script_does_not_abort_round() {
        let mut peers = PeerMap::new();
        let mut own = NodeInfo::new("10.0.0.1", 1);
        own.script_payload = Some("boom".into());
        peers.insert("n1".into(), own);

        let evaluator =
            |_: &str| -> Result<(), crate::ScriptError> { Err("syntax error".into()) };
        let engine = engine(store_with_identity(Some("acme"), Some("n1")), peers)
            .with_evaluator(Arc::new(evaluator));
        let round = engine.sync().await.unwrap();
        assert!(!round.script_evaluated);
    }

    /// Transport whose peer holds one transaction and answers with an
    /// unreadable bundle.
    struct GarbledPeer;

    impl PeerTransport for GarbledPeer {
        async fn list_transactions(&self, _peer: &PeerAddr) -> SyncResult<Vec<String>> {
            Ok(vec![syncdb_core::TransactionId::generate().to_string()])
        }

        async fn exchange(
            &self,
            _peer: &PeerAddr,
            _message: &DiffMessage,
        ) -> SyncResult<Vec<TransactionBundle>> {
            Ok(vec![TransactionBundle {
                id: "not-a-transaction".into(),
                committed_at: String::new(),
                statements: Vec::new(),
            }])
        }
    }

    #[tokio::test]
    async fn unreadable_bundles_still_count_as_received() {
        let mut peers = PeerMap::new();
        peers.insert("n2".into(), NodeInfo::new("10.0.0.2", 2));
        let engine = SyncEngine::new(
            SyncConfig::default(),
            store_with_identity(Some("acme"), Some("n1")),
            ListenerPort::new(),
            StaticDiscovery::new(peers),
            GarbledPeer,
        )
        .with_local_addresses(vec!["10.0.0.1".into()]);

        let round = engine.sync().await.unwrap();
        assert_eq!(round.exchanges[0].requested, 1);
        assert_eq!(round.exchanges[0].received, 1);
        assert_eq!(round.exchanges[0].replay.total(), 0);
        assert_eq!(engine.stats().bundles_received, 1);
    }

    /// Discovery whose first call never completes.
    #[derive(Default)]
    struct StallOnce {
        called: std::sync::atomic::AtomicBool,
    }

    impl Discovery for StallOnce {
        fn discover(
            &self,
            _request: &DiscoveryRequest,
        ) -> impl std::future::Future<Output = SyncResult<PeerMap>> + Send {
            let first = !self.called.swap(true, std::sync::atomic::Ordering::SeqCst);
            async move {
                if first {
                    std::future::pending::<()>().await;
                }
                Ok(PeerMap::new())
            }
        }
    }

    #[tokio::test]
    async fn cancelled_round_returns_to_idle() {
        let engine = SyncEngine::new(
            SyncConfig::default(),
            store_with_identity(Some("acme"), Some("n1")),
            ListenerPort::new(),
            StallOnce::default(),
            NoTransport,
        )
        .with_local_addresses(vec!["10.0.0.1".into()]);

        let cancelled = tokio::time::timeout(Duration::from_millis(100), engine.sync()).await;
        assert!(cancelled.is_err());
        assert_eq!(engine.state(), SyncState::Idle);

        let round = engine.sync().await.unwrap();
        assert_eq!(round.discovered, 0);
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn discovery_failure_aborts_round() {
        let engine = engine(store_with_identity(Some("acme"), Some("n1")), PeerMap::new());
        engine.discovery().fail_with("service down");
        assert!(matches!(engine.sync().await, Err(SyncError::Discovery(_))));
        assert_eq!(engine.state(), SyncState::Idle);
    }
}
