//! Sync round errors.

use syncdb_core::CoreError;
use syncdb_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result alias for sync rounds and peer calls.
pub type SyncResult<T> = Result<T, SyncError>;

/// Ways a sync round or a single peer exchange can fail.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A setting needed to identify this node is missing.
    #[error("identity unresolved: setting '{key}' is not set")]
    IdentityUnresolved {
        /// The missing setting.
        key: String,
    },

    /// A peer or the discovery service could not be reached or answered badly.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// True when a later round may succeed.
        retryable: bool,
    },

    /// The discovery service could not be used.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// A peer sent something that could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The local store failed.
    #[error("database error: {0}")]
    Database(#[from] CoreError),

    /// A round was started while another was running.
    #[error("cannot move from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { retryable: true, .. })
    }
}

impl From<ProtocolError> for SyncError {
    fn from(e: ProtocolError) -> Self {
        SyncError::Codec(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return SyncError::Codec(e.to_string());
        }
        let retryable = e.is_timeout() || e.is_connect() || e.status().map_or(false, |s| s.is_server_error());
        SyncError::Transport {
            message: e.to_string(),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::transport_retryable("reset").is_retryable());
        assert!(!SyncError::transport_fatal("404").is_retryable());
        assert!(!SyncError::IdentityUnresolved { key: "company".into() }.is_retryable());
    }

    #[test]
    fn display_names_the_missing_key() {
        let err = SyncError::IdentityUnresolved { key: "id".into() };
        assert_eq!(err.to_string(), "identity unresolved: setting 'id' is not set");
    }

    #[test]
    fn conversions() {
        let err: SyncError = CoreError::LockUnavailable.into();
        assert!(matches!(err, SyncError::Database(_)));
        let err: SyncError = ProtocolError::invalid_id("x").into();
        assert!(matches!(err, SyncError::Codec(_)));
    }
}
