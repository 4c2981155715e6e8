//! Store handle.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::log::schema;
use crate::log::Bundle;
use crate::settings::NODE_ID_KEY;
use crate::transaction::Transaction;
use crate::types::{Timestamp, TransactionId};
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

/// A SQLite database with a statement log.
///
/// The store owns a single connection behind a mutex. Every transaction
/// holds that mutex until it commits, rolls back or is dropped, which
/// serializes all transactions of one store.
///
/// `Store` is `Send + Sync`; share it with `Arc<Store>`.
pub struct Store {
    conn: Mutex<Connection>,
    config: StoreConfig,
}

impl Store {
    /// Opens (or creates) a store.
    ///
    /// Checks the database integrity, creates the log and settings tables if
    /// missing and, if configured, stores a fresh local node id.
    pub fn open(config: StoreConfig) -> CoreResult<Self> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.path)?
        };
        conn.busy_timeout(config.busy_timeout)?;
        schema::integrity_check(&conn)?;
        schema::create(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            config,
        };
        if store.config.generate_node_id {
            store.ensure_node_id()?;
        }

        info!(path = %store.config.path.display(), "store opened");
        Ok(store)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open(StoreConfig::in_memory())
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Begins a read-write transaction with a fresh id.
    ///
    /// Blocks until no other transaction is open on this store.
    #[track_caller]
    pub fn begin(&self) -> CoreResult<Transaction<'_>> {
        let conn = self.conn.lock();
        Transaction::begin_read_write(
            conn,
            TransactionId::generate(),
            None,
            false,
            self.config.trace_transactions,
        )
    }

    /// Like [`begin`](Self::begin) but fails with `LockUnavailable` instead of
    /// waiting.
    #[track_caller]
    pub fn try_begin(&self) -> CoreResult<Transaction<'_>> {
        let conn = self.conn.try_lock().ok_or(CoreError::LockUnavailable)?;
        Transaction::begin_read_write(
            conn,
            TransactionId::generate(),
            None,
            false,
            self.config.trace_transactions,
        )
    }

    /// Begins a read-write transaction that keeps a replicated identity.
    ///
    /// Fails with `DuplicateTransaction` if `id` is already recorded. An
    /// empty `committed_at` is replaced by the current time.
    #[track_caller]
    pub fn begin_with_identity(
        &self,
        id: TransactionId,
        committed_at: &Timestamp,
    ) -> CoreResult<Transaction<'_>> {
        let conn = self.conn.lock();
        Transaction::begin_read_write(
            conn,
            id,
            Some(committed_at),
            true,
            self.config.trace_transactions,
        )
    }

    /// Begins a query-only transaction.
    #[track_caller]
    pub fn begin_for_query(&self) -> CoreResult<Transaction<'_>> {
        let conn = self.conn.lock();
        Transaction::begin_query_only(conn, self.config.trace_transactions)
    }

    /// Runs `f` in a read-write transaction.
    ///
    /// Commits if `f` succeeds; rolls back otherwise.
    pub fn transaction<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    {
        let mut tx = self.begin()?;
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs `f` in a query-only transaction.
    pub fn read<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> CoreResult<T>,
    {
        let tx = self.begin_for_query()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Lists every recorded transaction id, oldest commit first.
    pub fn transaction_ids(&self) -> CoreResult<Vec<TransactionId>> {
        self.read(|tx| tx.transaction_ids())
    }

    /// Loads one recorded transaction with its entries.
    pub fn bundle(&self, id: TransactionId) -> CoreResult<Bundle> {
        self.read(|tx| tx.bundle(id))
    }

    /// Loads bundles for the given ids, skipping unknown ids.
    pub fn bundles(&self, ids: &[TransactionId]) -> CoreResult<Vec<Bundle>> {
        self.read(|tx| tx.bundles(ids))
    }

    fn ensure_node_id(&self) -> CoreResult<()> {
        self.transaction(|tx| match tx.get(NODE_ID_KEY) {
            Ok(_) => Ok(()),
            Err(CoreError::KeyNotFound { .. }) => {
                let id = Uuid::new_v4().to_string();
                debug!(node_id = %id, "generated node id");
                tx.set(NODE_ID_KEY, &id)
            }
            Err(e) => Err(e),
        })
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
