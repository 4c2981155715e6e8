//! Sync daemon and one-shot sync.

use super::{open, CommandResult};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use syncdb_core::{Store, COMPANY_KEY, NODE_ID_KEY};
use syncdb_sync_engine::{HttpSyncEngine, SyncConfig};
use syncdb_sync_server::{ServerConfig, ServerHandle, SyncServer};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{info, warn};

const PORT_WAIT: Duration = Duration::from_secs(5);

/// Options for the `run` command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Company id to store before starting.
    pub company: Option<String>,
    /// Node id to store before starting.
    pub node: Option<String>,
    /// Listener bind address.
    pub bind: IpAddr,
    /// Discovery service URL.
    pub discovery_url: String,
    /// Pause between rounds.
    pub interval: Duration,
}

/// Serves peers and runs a sync round every interval until Ctrl-C.
pub fn run(path: &Path, options: RunOptions) -> CommandResult<()> {
    let store = Arc::new(open(path)?);
    store_identity(&store, options.company.as_deref(), options.node.as_deref())?;

    let config = SyncConfig::new(options.discovery_url).with_sync_interval(options.interval);
    runtime()?.block_on(async move {
        let server = start_server(ServerConfig::new(options.bind), &store).await?;
        let engine = HttpSyncEngine::http(config, Arc::clone(&store), server.listener_port())?;

        let (stop, stopped) = watch::channel(false);
        let rounds = engine.run_periodic(stopped);
        tokio::pin!(rounds);
        tokio::select! {
            () = &mut rounds => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutting down");
                stop.send_replace(true);
                rounds.await;
            }
        }

        server.shutdown().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Runs a single sync round with a temporary listener.
pub fn sync_once(path: &Path, discovery_url: String) -> CommandResult<()> {
    let store = Arc::new(open(path)?);
    runtime()?.block_on(async move {
        let server = start_server(ServerConfig::default(), &store).await?;
        let engine = HttpSyncEngine::http(
            SyncConfig::new(discovery_url),
            Arc::clone(&store),
            server.listener_port(),
        )?;

        let round = engine.sync().await;
        server.shutdown().await?;
        let round = round?;

        println!(
            "Done: {} peers synced, {} failed, {} transactions applied",
            round.exchanges.len(),
            round.failures.len(),
            round.bundles_applied()
        );
        for failure in &round.failures {
            println!("  {} ({}): {}", failure.node_id, failure.peer, failure.error);
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn store_identity(store: &Store, company: Option<&str>, node: Option<&str>) -> CommandResult<()> {
    store.transaction(|tx| {
        if let Some(company) = company {
            tx.set(COMPANY_KEY, company)?;
        }
        if let Some(node) = node {
            tx.set(NODE_ID_KEY, node)?;
        }
        Ok(())
    })?;
    Ok(())
}

async fn start_server(config: ServerConfig, store: &Arc<Store>) -> CommandResult<ServerHandle> {
    let server = SyncServer::new(config, Arc::clone(store)).spawn();
    let port = server.wait_for_port(PORT_WAIT).await?;
    info!(port, "sync listener ready");
    Ok(server)
}

fn runtime() -> CommandResult<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
