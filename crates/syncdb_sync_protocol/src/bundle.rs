//! Wire form of a transaction bundle.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use syncdb_core::{Bundle, EntryId, LogEntry, Timestamp, TransactionId, TransactionRecord};

/// One logged statement as sent between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleStatement {
    /// Entry id.
    #[serde(alias = "ID")]
    pub id: String,
    /// Position in the transaction, starting at 1.
    #[serde(alias = "Seq", deserialize_with = "sequence_number")]
    pub sequence: u32,
    /// The encoded statement, passed through untouched.
    #[serde(alias = "SQL")]
    pub statement: String,
}

/// A transaction record with its statements, as sent between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBundle {
    /// Transaction id.
    #[serde(alias = "ID")]
    pub id: String,
    /// Commit time on the originating replica.
    #[serde(alias = "TxDatetime", default)]
    pub committed_at: String,
    /// Statements in any order; replay sorts them by sequence.
    #[serde(alias = "SQLs", default, deserialize_with = "nullable_list")]
    pub statements: Vec<BundleStatement>,
}

impl From<&Bundle> for TransactionBundle {
    fn from(bundle: &Bundle) -> Self {
        Self {
            id: bundle.record.id.to_string(),
            committed_at: bundle.record.committed_at.to_string(),
            statements: bundle
                .entries
                .iter()
                .map(|e| BundleStatement {
                    id: e.id.to_string(),
                    sequence: e.sequence,
                    statement: e.statement.clone(),
                })
                .collect(),
        }
    }
}

impl TryFrom<TransactionBundle> for Bundle {
    type Error = ProtocolError;

    fn try_from(wire: TransactionBundle) -> ProtocolResult<Self> {
        let id = wire
            .id
            .parse::<TransactionId>()
            .map_err(|_| ProtocolError::invalid_id(&wire.id))?;

        let entries = wire
            .statements
            .into_iter()
            .map(|s| {
                Ok(LogEntry {
                    id: s.id.parse::<EntryId>().map_err(|_| ProtocolError::invalid_id(&s.id))?,
                    transaction_id: id,
                    sequence: s.sequence,
                    statement: s.statement,
                    recorded_at: None,
                })
            })
            .collect::<ProtocolResult<Vec<_>>>()?;

        let bundle = Bundle::new(
            TransactionRecord {
                id,
                committed_at: Timestamp::new(wire.committed_at),
            },
            entries,
        );
        match bundle.sequence_gap() {
            Some(sequence) => Err(ProtocolError::InvalidSequence { id: wire.id, sequence }),
            None => Ok(bundle),
        }
    }
}

/// Converts local bundles to their wire form.
pub fn to_wire(bundles: &[Bundle]) -> Vec<TransactionBundle> {
    bundles.iter().map(TransactionBundle::from).collect()
}

/// Converts received bundles, dropping (and logging) the ones that cannot
/// be represented locally.
pub fn from_wire(bundles: Vec<TransactionBundle>) -> Vec<Bundle> {
    bundles
        .into_iter()
        .filter_map(|wire| match Bundle::try_from(wire) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                tracing::warn!(error = %e, "dropping unreadable bundle");
                None
            }
        })
        .collect()
}

fn sequence_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

fn nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
