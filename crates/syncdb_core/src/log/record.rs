//! Statement log records.

use crate::error::CoreResult;
use crate::types::{EntryId, Timestamp, TransactionId};
use syncdb_codec::Statement;

/// A committed transaction as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Globally unique transaction id.
    pub id: TransactionId,
    /// Commit time on the originating replica.
    pub committed_at: Timestamp,
}

/// One statement executed inside a logged transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Entry id, preserved across replicas.
    pub id: EntryId,
    /// Owning transaction.
    pub transaction_id: TransactionId,
    /// Position within the transaction, starting at 1.
    pub sequence: u32,
    /// Encoded [`Statement`], byte-for-byte as first recorded.
    pub statement: String,
    /// When this replica recorded the entry.
    pub recorded_at: Option<Timestamp>,
}

impl LogEntry {
    /// Decodes the recorded statement.
    pub fn decode_statement(&self) -> CoreResult<Statement> {
        Ok(Statement::decode(&self.statement)?)
    }
}

/// A transaction record plus its log entries: the unit exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// The transaction record.
    pub record: TransactionRecord,
    /// Entries in ascending sequence order.
    pub entries: Vec<LogEntry>,
}

impl Bundle {
    /// Creates a bundle, sorting entries into replay order.
    pub fn new(record: TransactionRecord, mut entries: Vec<LogEntry>) -> Self {
        entries.sort_by_key(|e| e.sequence);
        Self { record, entries }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.record.id
    }

    /// Returns true if the sequence numbers are exactly `1..=n`.
    #[must_use]
    pub fn has_contiguous_sequence(&self) -> bool {
        self.sequence_gap().is_none()
    }

    /// Returns the first sequence number that breaks `1..=n`, if any.
    #[must_use]
    pub fn sequence_gap(&self) -> Option<u32> {
        self.entries
            .iter()
            .enumerate()
            .find(|(i, e)| e.sequence as usize != i + 1)
            .map(|(_, e)| e.sequence)
    }
}
