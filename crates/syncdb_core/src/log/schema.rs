//! Statement log tables and accessors.
//!
//! All functions operate on a connection that the caller already holds
//! inside an open transaction; none of them begin or commit on their own.

use crate::error::{CoreError, CoreResult};
use crate::log::record::{LogEntry, TransactionRecord};
use crate::types::{EntryId, Timestamp, TransactionId};
use rusqlite::{params, Connection, OptionalExtension};

/// Table holding one row per logged transaction.
pub const TRANSACTIONS_TABLE: &str = "__dbtx__";

/// Table holding one row per logged statement.
pub const LOG_TABLE: &str = "__dblog__";

/// Table holding key/value settings.
pub const SETTINGS_TABLE: &str = "settings";

/// Current UTC time with millisecond precision.
const NOW: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS __dbtx__ (
    id TEXT NOT NULL PRIMARY KEY,
    datetime TEXT
);
CREATE INDEX IF NOT EXISTS datetime_dbtx_idx ON __dbtx__(datetime);

CREATE TABLE IF NOT EXISTS __dblog__ (
    id TEXT NOT NULL PRIMARY KEY,
    txid TEXT NOT NULL,
    sql TEXT NOT NULL,
    seq INTEGER NOT NULL,
    datetime TEXT
);
CREATE INDEX IF NOT EXISTS txid_dblog_idx ON __dblog__(txid);
CREATE INDEX IF NOT EXISTS datetime_dblog_idx ON __dblog__(datetime);

CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS key_idx_unique_settings ON settings(key);
"#;

/// Runs SQLite's integrity check.
pub(crate) fn integrity_check(conn: &Connection) -> CoreResult<()> {
    let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if result != "ok" {
        return Err(CoreError::invalid_operation(format!(
            "integrity check failed: {result}"
        )));
    }
    Ok(())
}

/// Creates the log and settings tables if missing.
pub(crate) fn create(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Inserts a transaction record, stamped now unless a time is given.
pub(crate) fn insert_record(
    conn: &Connection,
    id: TransactionId,
    committed_at: Option<&Timestamp>,
) -> CoreResult<()> {
    match committed_at {
        Some(ts) if !ts.is_empty() => {
            conn.execute(
                "INSERT INTO __dbtx__ (id, datetime) VALUES (?1, ?2)",
                params![id.to_string(), ts.as_str()],
            )?;
        }
        _ => {
            conn.execute(
                &format!("INSERT INTO __dbtx__ (id, datetime) VALUES (?1, {NOW})"),
                params![id.to_string()],
            )?;
        }
    }
    Ok(())
}

pub(crate) fn record_exists(conn: &Connection, id: TransactionId) -> CoreResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM __dbtx__ WHERE id = ?1",
            params![id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn delete_record(conn: &Connection, id: TransactionId) -> CoreResult<()> {
    conn.execute("DELETE FROM __dbtx__ WHERE id = ?1", params![id.to_string()])?;
    Ok(())
}

/// Appends one statement to the log.
pub(crate) fn insert_entry(
    conn: &Connection,
    entry_id: EntryId,
    txid: TransactionId,
    statement: &str,
    sequence: u32,
) -> CoreResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO __dblog__ (id, txid, sql, seq, datetime) VALUES (?1, ?2, ?3, ?4, {NOW})"
        ),
        params![entry_id.to_string(), txid.to_string(), statement, sequence],
    )?;
    Ok(())
}

pub(crate) fn entry_count(conn: &Connection, txid: TransactionId) -> CoreResult<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM __dblog__ WHERE txid = ?1",
        params![txid.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Lists every recorded transaction id, oldest commit first.
pub(crate) fn list_transaction_ids(conn: &Connection) -> CoreResult<Vec<TransactionId>> {
    let mut stmt = conn.prepare("SELECT id FROM __dbtx__ ORDER BY datetime, rowid")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter().map(|s| s.parse::<TransactionId>()).collect()
}

pub(crate) fn load_record(
    conn: &Connection,
    id: TransactionId,
) -> CoreResult<Option<TransactionRecord>> {
    let row = conn
        .query_row(
            "SELECT id, datetime FROM __dbtx__ WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .optional()?;

    row.map(|(id, datetime)| -> CoreResult<TransactionRecord> {
        Ok(TransactionRecord {
            id: id.parse()?,
            committed_at: Timestamp::new(datetime.unwrap_or_default()),
        })
    })
    .transpose()
}

/// Loads the entries of a transaction in sequence order.
pub(crate) fn load_entries(conn: &Connection, txid: TransactionId) -> CoreResult<Vec<LogEntry>> {
    let mut stmt =
        conn.prepare("SELECT id, seq, sql, datetime FROM __dblog__ WHERE txid = ?1 ORDER BY seq")?;
    let rows = stmt
        .query_map(params![txid.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, sequence, statement, recorded_at)| -> CoreResult<LogEntry> {
            Ok(LogEntry {
                id: id.parse()?,
                transaction_id: txid,
                sequence,
                statement,
                recorded_at: recorded_at.map(Timestamp::new),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn).unwrap();
        conn
    }

    #[test]
    fn create_is_idempotent() {
        let conn = conn();
        create(&conn).unwrap();
        integrity_check(&conn).unwrap();
    }

    #[test]
    fn record_lifecycle() {
        let conn = conn();
        let id = TransactionId::generate();
        assert!(!record_exists(&conn, id).unwrap());

        insert_record(&conn, id, None).unwrap();
        assert!(record_exists(&conn, id).unwrap());
        let record = load_record(&conn, id).unwrap().unwrap();
        assert!(!record.committed_at.is_empty());

        delete_record(&conn, id).unwrap();
        assert!(load_record(&conn, id).unwrap().is_none());
    }

    #[test]
    fn explicit_timestamp_is_kept() {
        let conn = conn();
        let id = TransactionId::generate();
        let ts = Timestamp::from("2019-05-01 08:30:00");
        insert_record(&conn, id, Some(&ts)).unwrap();
        assert_eq!(load_record(&conn, id).unwrap().unwrap().committed_at, ts);
    }

    #[test]
    fn duplicate_record_is_rejected_by_primary_key() {
        let conn = conn();
        let id = TransactionId::generate();
        insert_record(&conn, id, None).unwrap();
        assert!(insert_record(&conn, id, None).is_err());
    }

    #[test]
    fn ids_are_listed_by_commit_time() {
        let conn = conn();
        let late = TransactionId::generate();
        let early = TransactionId::generate();
        insert_record(&conn, late, Some(&Timestamp::from("2024-02-01 00:00:00"))).unwrap();
        insert_record(&conn, early, Some(&Timestamp::from("2024-01-01 00:00:00"))).unwrap();
        assert_eq!(list_transaction_ids(&conn).unwrap(), vec![early, late]);
    }

    #[test]
    fn entries_load_in_sequence_order() {
        let conn = conn();
        let txid = TransactionId::generate();
        insert_record(&conn, txid, None).unwrap();
        insert_entry(&conn, EntryId::generate(), txid, "{\"sql\":\"b\"}", 2).unwrap();
        insert_entry(&conn, EntryId::generate(), txid, "{\"sql\":\"a\"}", 1).unwrap();

        let entries = load_entries(&conn, txid).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[0].statement, "{\"sql\":\"a\"}");
        assert_eq!(entry_count(&conn, txid).unwrap(), 2);
    }
}
