//! HTTP listener.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use syncdb_core::Store;
use syncdb_sync_protocol::{ListenerPort, DIFFS_PATH, TRANSACTIONS_PATH};
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The sync listener.
///
/// Serves `GET /transactions` and `POST /diffs` for one store. The listener
/// binds an ephemeral port, publishes it through a [`ListenerPort`] and, if
/// it ever stops, binds a new port after
/// [`restart_backoff`](ServerConfig::restart_backoff).
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use syncdb_core::Store;
/// use syncdb_sync_server::{ServerConfig, SyncServer};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(Store::open_in_memory()?);
/// let handle = SyncServer::new(ServerConfig::default(), store).spawn();
/// let port = handle.wait_for_port(std::time::Duration::from_secs(5)).await?;
/// println!("listening on {port}");
/// handle.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct SyncServer {
    handler: Arc<RequestHandler>,
    context: Arc<HandlerContext>,
    port: ListenerPort,
    restart: Arc<Notify>,
}

impl SyncServer {
    /// Creates a listener for `store` with its own port slot.
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Self {
        Self::with_port(config, store, ListenerPort::new())
    }

    /// Creates a listener that publishes its port into `port`.
    pub fn with_port(config: ServerConfig, store: Arc<Store>, port: ListenerPort) -> Self {
        let context = Arc::new(HandlerContext::new(config, store));
        let handler = Arc::new(RequestHandler::new(Arc::clone(&context)));
        Self {
            handler,
            context,
            port,
            restart: Arc::new(Notify::new()),
        }
    }

    /// Returns the shared port slot.
    pub fn listener_port(&self) -> ListenerPort {
        self.port.clone()
    }

    /// Builds the HTTP routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route(TRANSACTIONS_PATH, get(list_transactions))
            .route(DIFFS_PATH, post(exchange_diffs))
            .layer(DefaultBodyLimit::max(self.context.config.max_body_bytes))
            .with_state(Arc::clone(&self.handler))
    }

    /// Binds a fresh ephemeral port and serves until `shutdown` turns true,
    /// a restart is requested or the listener fails.
    pub async fn serve_once(&self, shutdown: watch::Receiver<bool>) -> ServerResult<()> {
        let listener = TcpListener::bind((self.context.config.bind_ip, 0)).await?;
        let addr = listener.local_addr()?;
        self.port.publish(addr.port());
        info!(%addr, "sync listener started");

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(stopped_or_restarted(shutdown, Arc::clone(&self.restart)))
            .await;

        self.port.clear();
        result.map_err(ServerError::from)
    }

    /// Serves forever, restarting on a new port whenever the listener stops,
    /// until `shutdown` turns true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let backoff = self.context.config.restart_backoff;
        loop {
            let result = self.serve_once(shutdown.clone()).await;
            let stopping = *shutdown.borrow();
            match result {
                Ok(()) if stopping => break,
                Ok(()) => error!("sync listener exited"),
                Err(e) => error!(error = %e, "sync listener failed"),
            }
            if stopping {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = stopped(shutdown.clone()) => break,
            }
            warn!(backoff_ms = backoff.as_millis() as u64, "restarting sync listener");
        }
        info!("sync listener stopped");
    }

    /// Runs the listener loop on the current tokio runtime.
    pub fn spawn(self) -> ServerHandle {
        let (tx, rx) = watch::channel(false);
        let port = self.listener_port();
        let restart = Arc::clone(&self.restart);
        let task = tokio::spawn(self.run(rx));
        ServerHandle {
            port,
            restart,
            shutdown: tx,
            task,
        }
    }
}

/// Handle to a spawned listener loop.
pub struct ServerHandle {
    port: ListenerPort,
    restart: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Returns the port currently bound, if any.
    pub fn port(&self) -> Option<u16> {
        self.port.get()
    }

    /// Returns the shared port slot.
    pub fn listener_port(&self) -> ListenerPort {
        self.port.clone()
    }

    /// Waits until the listener has published a port.
    pub async fn wait_for_port(&self, timeout: Duration) -> ServerResult<u16> {
        let poll = async {
            loop {
                if let Some(port) = self.port.get() {
                    return port;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| ServerError::ListenerUnavailable(format!("no port after {timeout:?}")))
    }

    /// Drops the current listener; the loop binds a new port after the
    /// restart backoff.
    pub fn restart_listener(&self) {
        self.restart.notify_one();
    }

    /// Stops the listener and waits for the loop to finish.
    pub async fn shutdown(self) -> ServerResult<()> {
        self.shutdown.send_replace(true);
        self.task
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn stopped_or_restarted(shutdown: watch::Receiver<bool>, restart: Arc<Notify>) {
    tokio::select! {
        _ = stopped(shutdown) => {}
        _ = restart.notified() => info!("sync listener restart requested"),
    }
}

fn empty_list() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "application/json")],
        "[]",
    )
        .into_response()
}

async fn list_transactions(State(handler): State<Arc<RequestHandler>>) -> Response {
    match tokio::task::spawn_blocking(move || handler.list_transactions()).await {
        Ok(Ok(ids)) => (StatusCode::OK, Json(ids)).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to list transactions");
            empty_list()
        }
        Err(e) => {
            error!(error = %e, "list handler panicked");
            empty_list()
        }
    }
}

async fn exchange_diffs(
    State(handler): State<Arc<RequestHandler>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "unreadable diff request");
            return empty_list();
        }
    };

    match tokio::task::spawn_blocking(move || handler.exchange_raw(&body)).await {
        Ok(Ok(bundles)) => (StatusCode::OK, Json(bundles)).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "diff request failed");
            empty_list()
        }
        Err(e) => {
            error!(error = %e, "diff handler panicked");
            empty_list()
        }
    }
}
