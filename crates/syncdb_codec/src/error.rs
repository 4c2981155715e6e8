//! Statement codec errors.

use thiserror::Error;

/// Result alias for statement encoding.
pub type CodecResult<T> = Result<T, CodecError>;

/// Failures turning statements into log text and back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// What went wrong.
        message: String,
    },

    /// Failed to decode input.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Parser message.
        message: String,
    },

    /// Input was well-formed JSON but not the expected shape.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Which part of the statement is wrong.
        message: String,
    },

    /// NaN and infinite floats have no JSON representation.
    #[error("non-finite float values cannot be encoded")]
    NonFiniteFloat,
}

impl CodecError {
    /// Builds [`CodecError::EncodingFailed`].
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Builds [`CodecError::DecodingFailed`].
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Builds [`CodecError::InvalidStructure`].
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() {
            Self::invalid_structure(err.to_string())
        } else {
            Self::decoding_failed(err.to_string())
        }
    }
}
