//! Exchange endpoint messages.

use crate::bundle::TransactionBundle;
use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};

/// Body of `POST /diffs`: what the sender offers and what it is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffMessage {
    /// Transactions the receiver does not have.
    #[serde(alias = "IHas", default, deserialize_with = "nullable")]
    pub have: Vec<TransactionBundle>,
    /// Ids the sender is missing.
    #[serde(alias = "IWant", default, deserialize_with = "nullable")]
    pub want: Vec<String>,
}

impl DiffMessage {
    /// Creates a diff message.
    pub fn new(have: Vec<TransactionBundle>, want: Vec<String>) -> Self {
        Self { have, want }
    }

    /// Returns true if there is nothing to send and nothing to ask for.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.have.is_empty() && self.want.is_empty()
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Decodes the response of `POST /diffs`.
pub fn decode_bundles(bytes: &[u8]) -> ProtocolResult<Vec<TransactionBundle>> {
    Ok(serde_json::from_slice::<Option<Vec<TransactionBundle>>>(bytes)?.unwrap_or_default())
}

/// Decodes the response of `GET /transactions`.
pub fn decode_ids(bytes: &[u8]) -> ProtocolResult<Vec<String>> {
    Ok(serde_json::from_slice::<Option<Vec<String>>>(bytes)?.unwrap_or_default())
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
