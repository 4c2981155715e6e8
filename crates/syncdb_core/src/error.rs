//! Error types for SyncDB core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SyncDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The store is busy with another transaction (only from `try_begin`).
    #[error("store locked: another transaction is in progress")]
    LockUnavailable,

    /// A write was attempted inside a query-only transaction.
    #[error("store is in query-only mode")]
    QueryOnlyViolation,

    /// A transaction with this id has already been recorded.
    #[error("duplicate transaction: {id}")]
    DuplicateTransaction {
        /// The transaction id that already exists.
        id: String,
    },

    /// Settings lookup miss.
    #[error("key not found in settings: {key}")]
    KeyNotFound {
        /// The key that was looked up.
        key: String,
    },

    /// No transaction record with this id.
    #[error("transaction not found: {id}")]
    TransactionNotFound {
        /// The missing transaction id.
        id: String,
    },

    /// A stored or received identifier is not a valid UUID.
    #[error("invalid identifier: {value}")]
    InvalidId {
        /// The offending value.
        value: String,
    },

    /// Error reported by the relational engine.
    #[error("engine error: {0}")]
    Engine(#[from] rusqlite::Error),

    /// Statement encoding error.
    #[error("serialization error: {0}")]
    Codec(#[from] syncdb_codec::CodecError),

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a duplicate transaction error.
    pub fn duplicate_transaction(id: impl ToString) -> Self {
        Self::DuplicateTransaction { id: id.to_string() }
    }

    /// Creates a key not found error.
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates a transaction not found error.
    pub fn transaction_not_found(id: impl ToString) -> Self {
        Self::TransactionNotFound { id: id.to_string() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for errors raised by the relational engine.
    pub fn is_engine_error(&self) -> bool {
        matches!(self, CoreError::Engine(_))
    }
}
