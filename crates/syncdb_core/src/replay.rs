//! Applying transactions received from peers.
//!
//! Each bundle is applied in its own transaction that keeps the original
//! transaction id and commit time. A bundle whose id is already recorded is
//! skipped. A failing statement stops that bundle only: the statements
//! before it are kept and committed, the rest are dropped. If nothing at all
//! could be applied, the empty record is collected on commit and the bundle
//! will be offered again by the next exchange.

use crate::error::{CoreError, CoreResult};
use crate::log::Bundle;
use crate::store::Store;
use syncdb_codec::CodecError;
use tracing::{debug, warn};

/// What happened to one replayed bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Every statement was applied.
    Applied {
        /// Number of statements applied.
        statements: usize,
    },
    /// A statement failed; the ones before it were kept.
    Partial {
        /// Number of statements applied before the failure.
        applied: usize,
        /// Sequence number of the failing statement.
        failed_sequence: u32,
        /// The failure, as text.
        error: String,
    },
    /// The transaction was already recorded.
    Skipped,
}

impl ReplayOutcome {
    /// Returns true if every statement was applied.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Totals for a batch of replayed bundles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Bundles applied completely.
    pub applied: usize,
    /// Bundles applied up to a failing statement.
    pub partial: usize,
    /// Bundles already recorded locally.
    pub skipped: usize,
    /// Bundles that could not be started or committed.
    pub failed: usize,
}

impl ReplaySummary {
    /// Returns the number of bundles seen.
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied + self.partial + self.skipped + self.failed
    }
}

impl Store {
    /// Replays one bundle.
    ///
    /// Only errors that prevent the transaction from being started or
    /// committed are returned; a failing statement yields
    /// [`ReplayOutcome::Partial`]. A bundle whose sequence numbers are not
    /// exactly `1..=n` is rejected before anything runs.
    pub fn replay(&self, bundle: &Bundle) -> CoreResult<ReplayOutcome> {
        let id = bundle.id();
        if let Some(sequence) = bundle.sequence_gap() {
            return Err(CodecError::invalid_structure(format!(
                "transaction {id} has out-of-order sequence {sequence}"
            ))
            .into());
        }
        let mut tx = match self.begin_with_identity(id, &bundle.record.committed_at) {
            Ok(tx) => tx,
            Err(CoreError::DuplicateTransaction { .. }) => {
                debug!(txid = %id, "transaction already recorded, skipping");
                return Ok(ReplayOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        let mut applied = 0;
        for entry in &bundle.entries {
            if let Err(e) = tx.exec_replayed(entry) {
                warn!(
                    txid = %id,
                    seq = entry.sequence,
                    error = %e,
                    "replayed statement failed, skipping rest of transaction"
                );
                tx.commit()?;
                return Ok(ReplayOutcome::Partial {
                    applied,
                    failed_sequence: entry.sequence,
                    error: e.to_string(),
                });
            }
            applied += 1;
        }

        tx.commit()?;
        debug!(txid = %id, statements = applied, "transaction replayed");
        Ok(ReplayOutcome::Applied {
            statements: applied,
        })
    }

    /// Replays bundles in order. Never fails; problems are logged.
    pub fn replay_all(&self, bundles: &[Bundle]) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        for bundle in bundles {
            match self.replay(bundle) {
                Ok(ReplayOutcome::Applied { .. }) => summary.applied += 1,
                Ok(ReplayOutcome::Partial { .. }) => summary.partial += 1,
                Ok(ReplayOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    warn!(txid = %bundle.id(), error = %e, "failed to replay transaction");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogEntry, TransactionRecord};
    use crate::types::{EntryId, Timestamp, TransactionId};
    use crate::StoreConfig;
    use syncdb_codec::{Statement, Value};

    fn store() -> Store {
        Store::open(StoreConfig::in_memory().generate_node_id(false)).unwrap()
    }

    fn bundle_of(statements: &[&str]) -> Bundle {
        let id = TransactionId::generate();
        let entries = statements
            .iter()
            .enumerate()
            .map(|(i, sql)| LogEntry {
                id: EntryId::generate(),
                transaction_id: id,
                sequence: i as u32 + 1,
                statement: Statement::new(*sql, Vec::new()).encode().unwrap(),
                recorded_at: None,
            })
            .collect();
        Bundle::new(
            TransactionRecord {
                id,
                committed_at: Timestamp::from("2024-05-01 09:00:00.000"),
            },
            entries,
        )
    }

    fn names(store: &Store) -> Vec<String> {
        store
            .read(|tx| tx.query("SELECT name FROM foo ORDER BY rowid", &[]))
            .unwrap()
            .column_text(0)
    }

    #[test]
    fn replay_reproduces_source_transaction() {
        let source = store();
        let id = source
            .transaction(|tx| {
                tx.exec("CREATE TABLE foo (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
                for name in ["teste1", "teste2"] {
                    tx.exec("INSERT INTO foo VALUES (NULL, ?)", &[Value::from(name)])?;
                }
                Ok(tx.id())
            })
            .unwrap()
            .unwrap();
        let original = source.bundle(id).unwrap();

        let target = store();
        assert_eq!(
            target.replay(&original).unwrap(),
            ReplayOutcome::Applied { statements: 3 }
        );

        let copy = target.bundle(id).unwrap();
        assert_eq!(copy.record, original.record);
        for (a, b) in copy.entries.iter().zip(&original.entries) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.sequence, b.sequence);
            assert_eq!(a.statement, b.statement);
        }
        assert_eq!(names(&target), names(&source));
    }

    #[test]
    fn known_transaction_is_skipped() {
        let target = store();
        let bundle = bundle_of(&["CREATE TABLE foo (name TEXT)", "INSERT INTO foo VALUES ('a')"]);
        assert!(target.replay(&bundle).unwrap().is_applied());
        assert_eq!(target.replay(&bundle).unwrap(), ReplayOutcome::Skipped);
        assert_eq!(names(&target), vec!["a"]);
    }

    #[test]
    fn failing_statement_keeps_prefix() {
        let target = store();
        let bundle = bundle_of(&[
            "CREATE TABLE foo (name TEXT)",
            "INSERT INTO foo VALUES ('a')",
            "INSERT INTO missing VALUES ('b')",
            "INSERT INTO foo VALUES ('c')",
        ]);

        match target.replay(&bundle).unwrap() {
            ReplayOutcome::Partial {
                applied,
                failed_sequence,
                ..
            } => {
                assert_eq!(applied, 2);
                assert_eq!(failed_sequence, 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(names(&target), vec!["a"]);
        assert_eq!(target.bundle(bundle.id()).unwrap().entries.len(), 2);
    }

    #[test]
    fn nothing_applied_leaves_no_record() {
        let target = store();
        let bundle = bundle_of(&["INSERT INTO missing VALUES (1)"]);
        assert!(matches!(
            target.replay(&bundle).unwrap(),
            ReplayOutcome::Partial { applied: 0, .. }
        ));
        assert!(target.transaction_ids().unwrap().is_empty());
    }

    #[test]
    fn broken_sequence_is_rejected_untouched() {
        let target = store();
        let mut bundle = bundle_of(&[
            "CREATE TABLE foo (name TEXT)",
            "INSERT INTO foo VALUES ('a')",
            "INSERT INTO foo VALUES ('b')",
        ]);
        for (entry, sequence) in bundle.entries.iter_mut().zip([2, 2, 7]) {
            entry.sequence = sequence;
        }

        assert!(matches!(target.replay(&bundle), Err(CoreError::Codec(_))));
        assert!(target.transaction_ids().unwrap().is_empty());
        assert_eq!(target.replay_all(&[bundle]).failed, 1);
    }

    #[test]
    fn replay_all_counts_outcomes() {
        let target = store();
        let create = bundle_of(&["CREATE TABLE foo (name TEXT)"]);
        let broken = bundle_of(&["INSERT INTO missing VALUES (1)"]);
        let summary = target.replay_all(&[create.clone(), broken, create]);
        assert_eq!(
            summary,
            ReplaySummary {
                applied: 1,
                partial: 1,
                skipped: 1,
                failed: 0,
            }
        );
        assert_eq!(summary.total(), 3);
    }
}
