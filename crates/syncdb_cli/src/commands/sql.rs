//! SQL and log inspection commands.

use super::{open, CommandResult};
use serde::Serialize;
use std::path::Path;
use syncdb_core::{QueryResult, Store, Value, LOG_TABLE, TRANSACTIONS_TABLE};

/// Query output for `--format json`.
#[derive(Debug, Serialize)]
struct QueryOutput<'a> {
    columns: &'a [String],
    rows: Vec<&'a [Value]>,
}

/// Executes `sql` in its own logged transaction.
pub fn exec(path: &Path, sql: &str) -> CommandResult<String> {
    exec_in(&open(path)?, sql)
}

/// Runs a read-only query and renders the result.
pub fn query(path: &Path, sql: &str, format: &str) -> CommandResult<String> {
    let result = query_in(&open(path)?, sql)?;
    match format {
        "json" => {
            let output = QueryOutput {
                columns: &result.columns,
                rows: result.rows.iter().map(|row| row.cells()).collect(),
            };
            Ok(serde_json::to_string_pretty(&output)?)
        }
        _ => Ok(render(&result)),
    }
}

/// Lists recorded transaction ids, oldest commit first.
pub fn ids(path: &Path) -> CommandResult<Vec<String>> {
    let store = open(path)?;
    Ok(store
        .transaction_ids()?
        .iter()
        .map(ToString::to_string)
        .collect())
}

/// Lists tables other than the log and SQLite internal tables.
pub fn tables(path: &Path) -> CommandResult<String> {
    Ok(render(&tables_in(&open(path)?)?))
}

/// Describes the columns of `table`.
pub fn schema(path: &Path, table: &str) -> CommandResult<String> {
    Ok(render(&schema_in(&open(path)?, table)?))
}

pub(crate) fn exec_in(store: &Store, sql: &str) -> CommandResult<String> {
    let changed = store.transaction(|tx| tx.exec(sql, &[]))?;
    Ok(format!("EXECUTED ({changed} rows changed)"))
}

pub(crate) fn query_in(store: &Store, sql: &str) -> CommandResult<QueryResult> {
    Ok(store.read(|tx| tx.query(sql, &[]))?)
}

pub(crate) fn tables_in(store: &Store) -> CommandResult<QueryResult> {
    let sql = "SELECT name FROM sqlite_master \
               WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT IN (?, ?) \
               ORDER BY name";
    let params = [Value::from(TRANSACTIONS_TABLE), Value::from(LOG_TABLE)];
    Ok(store.read(|tx| tx.query(sql, &params))?)
}

pub(crate) fn schema_in(store: &Store, table: &str) -> CommandResult<QueryResult> {
    let sql = "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?)";
    let result = store.read(|tx| tx.query(sql, &[Value::from(table)]))?;
    if result.is_empty() {
        return Err(format!("no such table: {table}").into());
    }
    Ok(result)
}

/// Renders rows as `| a | b |` lines under a header line.
fn render(result: &QueryResult) -> String {
    let mut out = format!("| {} |", result.columns.join(" | "));
    for row in &result.rows {
        out.push_str("\n| ");
        for cell in row.cells() {
            out.push_str(&cell.to_text());
            out.push_str(" | ");
        }
    }
    out
}
