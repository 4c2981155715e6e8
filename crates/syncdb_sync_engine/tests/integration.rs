//! Two replicas converging over real loopback HTTP.

use std::sync::Arc;
use std::time::Duration;
use syncdb_core::{Store, StoreConfig, Value, COMPANY_KEY, NODE_ID_KEY};
use syncdb_sync_engine::{HttpPeerTransport, StaticDiscovery, SyncConfig, SyncEngine};
use syncdb_sync_protocol::{NodeInfo, PeerMap};
use syncdb_sync_server::{ServerConfig, ServerHandle, SyncServer};

type Engine = SyncEngine<StaticDiscovery, HttpPeerTransport>;

struct Replica {
    store: Arc<Store>,
    server: ServerHandle,
    engine: Engine,
}

impl Replica {
    async fn start(node_id: &str, company: &str) -> Self {
        Self::start_with(StoreConfig::in_memory(), node_id, company).await
    }

    async fn start_with(config: StoreConfig, node_id: &str, company: &str) -> Self {
        let store = Arc::new(Store::open(config).unwrap());
        store
            .transaction(|tx| {
                tx.set(COMPANY_KEY, company)?;
                tx.set(NODE_ID_KEY, node_id)
            })
            .unwrap();

        let server = SyncServer::new(ServerConfig::localhost(), Arc::clone(&store)).spawn();
        server.wait_for_port(Duration::from_secs(5)).await.unwrap();

        let config = SyncConfig::default()
            .with_loopback(true)
            .with_request_timeout(Duration::from_secs(5));
        let engine = SyncEngine::new(
            config,
            Arc::clone(&store),
            server.listener_port(),
            StaticDiscovery::default(),
            HttpPeerTransport::new(Duration::from_secs(5)).unwrap(),
        )
        .with_local_addresses(vec!["127.0.0.1".into()]);

        Self {
            store,
            server,
            engine,
        }
    }

    fn node_info(&self) -> NodeInfo {
        NodeInfo::new("127.0.0.1", self.server.port().unwrap())
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .store
            .transaction_ids()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        ids.sort();
        ids
    }

    fn foo(&self) -> Vec<Vec<String>> {
        let result = self
            .store
            .read(|tx| tx.query("select * from foo", &[]))
            .unwrap();
        result
            .rows
            .iter()
            .map(|row| row.cells().iter().map(Value::to_text).collect())
            .collect()
    }
}

fn directory(nodes: &[(&str, &Replica)]) -> PeerMap {
    nodes
        .iter()
        .map(|(id, replica)| (id.to_string(), replica.node_info()))
        .collect()
}

#[tokio::test]
async fn replicas_converge_after_one_round() {
    let a = Replica::start("n1", "acme").await;
    let b = Replica::start("n2", "acme").await;

    a.store
        .transaction(|tx| {
            tx.exec("create table foo (id integer primary key, name text)", &[])?;
            for name in ["teste1", "teste2", "teste3", "teste4"] {
                tx.exec("insert into foo values (NULL, ?)", &[Value::from(name)])?;
            }
            Ok(())
        })
        .unwrap();

    let peers = directory(&[("n1", &a), ("n2", &b)]);
    a.engine.discovery().set_peers(peers);

    let round = a.engine.sync().await.unwrap();
    assert_eq!(round.exchanges.len(), 1);
    assert!(round.failures.is_empty());
    assert_eq!(round.exchanges[0].sent, 1);

    let expected = vec![
        vec!["1".to_string(), "teste1".to_string()],
        vec!["2".to_string(), "teste2".to_string()],
        vec!["3".to_string(), "teste3".to_string()],
        vec!["4".to_string(), "teste4".to_string()],
    ];
    assert_eq!(a.foo(), expected);
    assert_eq!(b.foo(), expected);
    assert_eq!(a.ids(), b.ids());

    a.server.shutdown().await.unwrap();
    b.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn disjoint_sets_converge_to_union() {
    let a = Replica::start("n1", "acme").await;
    let b = Replica::start("n2", "acme").await;

    for (replica, name) in [(&a, "from-a"), (&b, "from-b")] {
        replica
            .store
            .transaction(|tx| {
                tx.exec(&format!("create table \"{name}\" (v text)"), &[])?;
                tx.exec(&format!("insert into \"{name}\" values ('x')"), &[])?;
                Ok(())
            })
            .unwrap();
    }

    b.engine.discovery().set_peers(directory(&[("n1", &a), ("n2", &b)]));
    let round = b.engine.sync().await.unwrap();
    assert_eq!(round.exchanges[0].replay.applied, 1);

    assert_eq!(a.ids().len(), 2);
    assert_eq!(a.ids(), b.ids());

    // A second round has nothing left to move.
    let round = b.engine.sync().await.unwrap();
    assert_eq!(round.exchanges[0].sent, 0);
    assert_eq!(round.exchanges[0].requested, 0);

    let stats = b.engine.stats();
    assert_eq!(stats.rounds_completed, 2);
    assert_eq!(stats.bundles_sent, 1);
    assert_eq!(stats.bundles_applied, 1);

    a.server.shutdown().await.unwrap();
    b.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_peer_does_not_stop_others() {
    let a = Replica::start("n1", "acme").await;
    let b = Replica::start("n2", "acme").await;
    a.store
        .transaction(|tx| tx.exec("create table foo (v text)", &[]))
        .unwrap();

    let mut peers = directory(&[("n1", &a), ("n2", &b)]);
    peers.insert("n0".into(), NodeInfo::new("127.0.0.1", 9));
    a.engine.discovery().set_peers(peers);

    let round = a.engine.sync().await.unwrap();
    assert_eq!(round.failures.len(), 1);
    assert_eq!(round.failures[0].node_id, "n0");
    assert_eq!(round.exchanges.len(), 1);
    assert_eq!(a.ids(), b.ids());

    a.server.shutdown().await.unwrap();
    b.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn global_settings_replicate_but_local_ones_do_not() {
    let dir = tempfile::tempdir().unwrap();
    let a = Replica::start("n1", "acme").await;
    let b = Replica::start_with(StoreConfig::new(dir.path().join("b.db")), "n2", "acme").await;
    a.store
        .transaction(|tx| tx.set_global("greeting", "hello"))
        .unwrap();

    a.engine.discovery().set_peers(directory(&[("n1", &a), ("n2", &b)]));
    a.engine.sync().await.unwrap();

    let (greeting, node_id) = b
        .store
        .read(|tx| Ok((tx.get("greeting")?, tx.get(NODE_ID_KEY)?)))
        .unwrap();
    assert_eq!(greeting, "hello");
    assert_eq!(node_id, "n2");

    a.server.shutdown().await.unwrap();
    b.server.shutdown().await.unwrap();
}
