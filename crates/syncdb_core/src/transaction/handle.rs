//! The active transaction handle.

use crate::error::{CoreError, CoreResult};
use crate::log::schema;
use crate::log::{Bundle, LogEntry};
use crate::row::{from_sql, to_sql, QueryResult, Row};
use crate::types::{EntryId, Timestamp, TransactionId, TransactionMode};
use parking_lot::MutexGuard;
use rusqlite::{params_from_iter, Connection};
use std::panic::Location;
use syncdb_codec::{Statement, Value};
use tracing::{debug, warn};

const EXEC_SAVEPOINT: &str = "logged_statement";
const REPLAY_SAVEPOINT: &str = "replay_entry";

/// An open transaction on a [`Store`](crate::Store).
///
/// Holds the store's connection lock for its whole lifetime, so at most one
/// transaction exists per store at any time. Consumed by [`commit`] or
/// [`rollback`]; a handle dropped without either is rolled back.
///
/// [`commit`]: Transaction::commit
/// [`rollback`]: Transaction::rollback
pub struct Transaction<'a> {
    conn: MutexGuard<'a, Connection>,
    mode: TransactionMode,
    /// `None` for query-only transactions, which write no record.
    id: Option<TransactionId>,
    next_sequence: u32,
    finished: bool,
    trace: bool,
}

impl<'a> Transaction<'a> {
    /// Opens a read-write transaction and inserts its record.
    ///
    /// With `reject_duplicate`, fails with `DuplicateTransaction` if `id` is
    /// already recorded.
    #[track_caller]
    pub(crate) fn begin_read_write(
        conn: MutexGuard<'a, Connection>,
        id: TransactionId,
        committed_at: Option<&Timestamp>,
        reject_duplicate: bool,
        trace: bool,
    ) -> CoreResult<Self> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let tx = Self {
            conn,
            mode: TransactionMode::ReadWrite,
            id: Some(id),
            next_sequence: 1,
            finished: false,
            trace,
        };

        if reject_duplicate && schema::record_exists(&tx.conn, id)? {
            return Err(CoreError::duplicate_transaction(id));
        }
        schema::insert_record(&tx.conn, id, committed_at)?;

        tx.trace_event("begin");
        Ok(tx)
    }

    /// Opens a query-only transaction. No record is written.
    #[track_caller]
    pub(crate) fn begin_query_only(conn: MutexGuard<'a, Connection>, trace: bool) -> CoreResult<Self> {
        conn.execute_batch("BEGIN")?;
        let tx = Self {
            conn,
            mode: TransactionMode::QueryOnly,
            id: None,
            next_sequence: 1,
            finished: false,
            trace,
        };
        tx.trace_event("begin query");
        Ok(tx)
    }

    /// Returns the transaction id, or `None` for a query-only transaction.
    #[must_use]
    pub fn id(&self) -> Option<TransactionId> {
        self.id
    }

    /// Returns the transaction mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns true if writes are rejected.
    #[must_use]
    pub fn is_query_only(&self) -> bool {
        self.mode == TransactionMode::QueryOnly
    }

    /// Returns the sequence number the next logged statement will get.
    #[must_use]
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Executes a write and appends it to the statement log.
    ///
    /// The statement and its log entry run under one savepoint: if either
    /// fails, both are undone and the transaction stays usable. Returns the
    /// number of changed rows.
    pub fn exec(&mut self, sql: &str, params: &[Value]) -> CoreResult<usize> {
        let id = self.writable()?;
        let encoded = Statement::new(sql, params.to_vec()).encode()?;
        let sequence = self.next_sequence;

        let changed = self.under_savepoint(EXEC_SAVEPOINT, |tx| {
            let changed = tx.execute(sql, params)?;
            schema::insert_entry(&tx.conn, EntryId::generate(), id, &encoded, sequence)?;
            Ok(changed)
        })?;
        debug!(txid = %id, seq = sequence, sql, "statement logged");
        self.next_sequence += 1;
        Ok(changed)
    }

    /// Executes a write without logging it.
    ///
    /// Only for replica-local state that must never reach a peer.
    pub fn exec_without_log(&mut self, sql: &str, params: &[Value]) -> CoreResult<usize> {
        self.writable()?;
        self.execute(sql, params)
    }

    /// Runs a query and returns its rows with column names.
    ///
    /// Allowed in any mode. A statement that would modify the database is
    /// rejected before it runs: writes must go through [`exec`](Self::exec)
    /// so they are logged.
    pub fn query(&self, sql: &str, params: &[Value]) -> CoreResult<QueryResult> {
        let mut stmt = self.conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(if self.is_query_only() {
                CoreError::QueryOnlyViolation
            } else {
                CoreError::invalid_operation("query cannot modify the database, use exec")
            });
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql)))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let cells = (0..width)
                .map(|i| row.get_ref(i).map(from_sql))
                .collect::<Result<Vec<_>, _>>()?;
            result.push(Row::new(cells));
        }

        Ok(QueryResult {
            columns,
            rows: result,
        })
    }

    /// Lists every recorded transaction id, oldest commit first.
    pub fn transaction_ids(&self) -> CoreResult<Vec<TransactionId>> {
        schema::list_transaction_ids(&self.conn)
    }

    /// Loads a recorded transaction with its log entries.
    pub fn bundle(&self, id: TransactionId) -> CoreResult<Bundle> {
        let record =
            schema::load_record(&self.conn, id)?.ok_or_else(|| CoreError::transaction_not_found(id))?;
        let entries = schema::load_entries(&self.conn, id)?;
        Ok(Bundle::new(record, entries))
    }

    /// Loads the bundles for `ids`, skipping ids that are not recorded.
    pub fn bundles(&self, ids: &[TransactionId]) -> CoreResult<Vec<Bundle>> {
        let mut bundles = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.bundle(id) {
                Ok(bundle) => bundles.push(bundle),
                Err(CoreError::TransactionNotFound { .. }) => {
                    debug!(txid = %id, "requested transaction not recorded");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(bundles)
    }

    /// Commits the transaction and releases the store.
    ///
    /// A read-write transaction that logged nothing has its record removed
    /// first.
    #[track_caller]
    pub fn commit(mut self) -> CoreResult<()> {
        if let (TransactionMode::ReadWrite, Some(id)) = (self.mode, self.id) {
            if schema::entry_count(&self.conn, id)? == 0 {
                schema::delete_record(&self.conn, id)?;
                debug!(txid = %id, "empty transaction collected");
            }
        }
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        self.trace_event("commit");
        Ok(())
    }

    /// Rolls back everything done in the transaction and releases the store.
    #[track_caller]
    pub fn rollback(mut self) -> CoreResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        self.trace_event("rollback");
        Ok(())
    }

    /// Applies one replicated entry, keeping its id, sequence and text.
    ///
    /// Runs under a savepoint: on failure neither the statement nor its log
    /// row survive, and the transaction stays usable.
    pub(crate) fn exec_replayed(&mut self, entry: &LogEntry) -> CoreResult<()> {
        let id = self.writable()?;
        let statement = entry.decode_statement()?;

        self.under_savepoint(REPLAY_SAVEPOINT, |tx| {
            tx.execute(&statement.sql, &statement.params)?;
            schema::insert_entry(&tx.conn, entry.id, id, &entry.statement, entry.sequence)
        })?;
        self.next_sequence = entry.sequence.saturating_add(1);
        Ok(())
    }

    /// Runs `f` under a savepoint, undoing everything it did if it fails.
    fn under_savepoint<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&Self) -> CoreResult<T>,
    ) -> CoreResult<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name}"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(undo) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                {
                    warn!(txid = ?self.id.map(|id| id.to_string()), error = %undo, "failed to undo statement");
                }
                Err(e)
            }
        }
    }

    fn writable(&self) -> CoreResult<TransactionId> {
        match (self.mode, self.id) {
            (TransactionMode::QueryOnly, _) => Err(CoreError::QueryOnlyViolation),
            (TransactionMode::ReadWrite, Some(id)) => Ok(id),
            (TransactionMode::ReadWrite, None) => Err(CoreError::invalid_operation(
                "read-write transaction without an id",
            )),
        }
    }

    fn execute(&self, sql: &str, params: &[Value]) -> CoreResult<usize> {
        let changed = self
            .conn
            .execute(sql, params_from_iter(params.iter().map(to_sql)))?;
        Ok(changed)
    }

    #[track_caller]
    fn trace_event(&self, event: &'static str) {
        if self.trace {
            let caller = Location::caller();
            debug!(
                event,
                txid = ?self.id.map(|id| id.to_string()),
                mode = ?self.mode,
                caller = %caller,
                "transaction"
            );
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "rollback of abandoned transaction failed");
        } else if self.trace {
            debug!(txid = ?self.id.map(|id| id.to_string()), "abandoned transaction rolled back");
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("next_sequence", &self.next_sequence)
            .finish_non_exhaustive()
    }
}
