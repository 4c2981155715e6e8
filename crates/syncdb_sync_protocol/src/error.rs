//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding or converting wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message is not valid JSON of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A transaction or entry id is not a valid UUID.
    #[error("invalid id in message: {value}")]
    InvalidId {
        /// The offending value.
        value: String,
    },

    /// A bundle carries a sequence number below 1.
    #[error("invalid sequence {sequence} in transaction {id}")]
    InvalidSequence {
        /// Transaction id.
        id: String,
        /// The offending sequence number.
        sequence: u32,
    },
}

impl ProtocolError {
    /// Creates an invalid id error.
    pub fn invalid_id(value: impl Into<String>) -> Self {
        Self::InvalidId {
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::invalid_id("xyz");
        assert_eq!(err.to_string(), "invalid id in message: xyz");
        let err: ProtocolError = serde_json::from_str::<Vec<String>>("{").unwrap_err().into();
        assert!(err.to_string().starts_with("malformed message"));
    }
}
