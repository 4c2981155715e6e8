//! Request handlers for sync endpoints.
//!
//! Handlers are synchronous: they take the store lock once per transaction
//! and are run on the blocking pool by the HTTP layer.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use std::sync::Arc;
use syncdb_core::{ReplaySummary, Store};
use syncdb_sync_protocol::{from_wire, parse_ids, to_wire, DiffMessage, TransactionBundle};
use tracing::{debug, info};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The replica served by this listener.
    pub store: Arc<Store>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Self {
        Self { config, store }
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the handler context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Lists every local transaction id, oldest commit first.
    pub fn list_transactions(&self) -> ServerResult<Vec<String>> {
        let ids = self.context.store.transaction_ids()?;
        Ok(ids.iter().map(ToString::to_string).collect())
    }

    /// Applies the sender's `have` and returns the local bundles it wants.
    pub fn exchange(
        &self,
        message: DiffMessage,
    ) -> ServerResult<(Vec<TransactionBundle>, ReplaySummary)> {
        let received = from_wire(message.have);
        let summary = self.context.store.replay_all(&received);
        if summary.total() > 0 {
            info!(
                applied = summary.applied,
                partial = summary.partial,
                skipped = summary.skipped,
                failed = summary.failed,
                "applied transactions from peer"
            );
        }

        let wanted = parse_ids(&message.want);
        let bundles = self.context.store.bundles(&wanted)?;
        debug!(
            requested = message.want.len(),
            sent = bundles.len(),
            "answering diff request"
        );
        Ok((to_wire(&bundles), summary))
    }

    /// Decodes a raw `POST /diffs` body and runs [`exchange`](Self::exchange).
    pub fn exchange_raw(&self, body: &[u8]) -> ServerResult<Vec<TransactionBundle>> {
        let message = DiffMessage::decode(body)?;
        Ok(self.exchange(message)?.0)
    }
}
