//! Id-set reconciliation.

use std::collections::HashSet;
use syncdb_core::TransactionId;
use tracing::debug;

/// Difference between the local and a remote set of transaction ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdDiff {
    /// Ids the peer has and we lack, in the peer's order.
    pub only_remote: Vec<String>,
    /// Ids we have and the peer lacks, in local commit order.
    pub only_local: Vec<TransactionId>,
}

impl IdDiff {
    /// Computes both one-sided differences.
    ///
    /// Remote ids are compared as canonical UUID text, so case and
    /// surrounding whitespace do not matter. Remote entries that are not
    /// UUIDs are ignored.
    pub fn compute(local: &[TransactionId], remote: &[String]) -> Self {
        let remote_ids = parse_ids(remote);
        let local_set: HashSet<TransactionId> = local.iter().copied().collect();
        let remote_set: HashSet<TransactionId> = remote_ids.iter().copied().collect();

        let only_remote = remote_ids
            .iter()
            .filter(|id| !local_set.contains(*id))
            .map(ToString::to_string)
            .collect();
        let only_local = local
            .iter()
            .filter(|id| !remote_set.contains(*id))
            .copied()
            .collect();

        Self {
            only_remote,
            only_local,
        }
    }

    /// Returns true if both sides already hold the same ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.only_remote.is_empty() && self.only_local.is_empty()
    }
}

/// Parses id strings, dropping duplicates and values that are not UUIDs.
pub fn parse_ids(ids: &[String]) -> Vec<TransactionId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter_map(|s| match s.parse::<TransactionId>() {
            Ok(id) => Some(id),
            Err(_) => {
                debug!(value = %s, "ignoring malformed transaction id");
                None
            }
        })
        .filter(|id| seen.insert(*id))
        .collect()
}
