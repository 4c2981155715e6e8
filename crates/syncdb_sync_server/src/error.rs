//! Listener and request errors.

use syncdb_core::CoreError;
use syncdb_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result alias for request handling.
pub type ServerResult<T> = Result<T, ServerError>;

/// Failures while serving peers. All of them answer `404 []` on the wire.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The body was not a readable diff message.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] CoreError),

    /// The listener did not come up in time.
    #[error("listener unavailable: {0}")]
    ListenerUnavailable(String),

    /// A handler task failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtocolError> for ServerError {
    fn from(e: ProtocolError) -> Self {
        ServerError::InvalidRequest(e.to_string())
    }
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::InvalidRequest(_))
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
