//! Durable statement log.
//!
//! Every committed read-write transaction leaves one row in `__dbtx__` and
//! one row per executed statement in `__dblog__`. These rows are the unit
//! of replication between replicas.

mod record;
pub(crate) mod schema;

pub use record::{Bundle, LogEntry, TransactionRecord};
pub use schema::{LOG_TABLE, SETTINGS_TABLE, TRANSACTIONS_TABLE};
