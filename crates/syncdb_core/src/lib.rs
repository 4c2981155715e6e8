//! # SyncDB Core
//!
//! A SQLite database that records every write it executes.
//!
//! This crate provides:
//! - The statement log (`__dbtx__` / `__dblog__`) and its accessors
//! - The transaction manager: one transaction per store at a time,
//!   sequence-numbered logging of writes, query-only transactions and
//!   collection of empty transactions
//! - Local and replicated key/value settings
//! - Materialization of transactions into [`Bundle`]s and their replay on
//!   another replica
//!
//! ```
//! use syncdb_core::{Store, Value};
//!
//! let store = Store::open_in_memory()?;
//! let mut tx = store.begin()?;
//! tx.exec("CREATE TABLE foo (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
//! tx.exec("INSERT INTO foo VALUES (NULL, ?)", &[Value::from("teste")])?;
//! tx.commit()?;
//!
//! assert_eq!(store.transaction_ids()?.len(), 1);
//! # Ok::<(), syncdb_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod log;
mod replay;
mod row;
mod settings;
mod store;
mod transaction;
mod types;

pub use config::{StoreConfig, IN_MEMORY};
pub use error::{CoreError, CoreResult};
pub use log::{Bundle, LogEntry, TransactionRecord, LOG_TABLE, SETTINGS_TABLE, TRANSACTIONS_TABLE};
pub use replay::{ReplayOutcome, ReplaySummary};
pub use row::{QueryResult, Row};
pub use settings::{COMPANY_KEY, NODE_ID_KEY};
pub use store::Store;
pub use syncdb_codec::{Statement, Value};
pub use transaction::Transaction;
pub use types::{EntryId, Timestamp, TransactionId, TransactionMode};
