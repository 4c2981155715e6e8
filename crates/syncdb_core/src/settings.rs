//! Key/value settings.
//!
//! Settings live in an ordinary table, so whether a value replicates only
//! depends on how it is written: [`Transaction::set`] bypasses the log and
//! stays on this replica, [`Transaction::set_global`] is logged and reaches
//! every peer.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use syncdb_codec::Value;

/// Setting holding the company (replica group) id.
pub const COMPANY_KEY: &str = "company";

/// Setting holding this replica's node id.
pub const NODE_ID_KEY: &str = "id";

const SELECT: &str = "SELECT value FROM settings WHERE key = ?";
const DELETE: &str = "DELETE FROM settings WHERE key = ?";
const INSERT: &str = "INSERT INTO settings (key, value) VALUES (?, ?)";

impl Transaction<'_> {
    /// Reads a setting.
    ///
    /// Fails with `KeyNotFound` if the key was never set.
    pub fn get(&self, key: &str) -> CoreResult<String> {
        let result = self.query(SELECT, &[Value::from(key)])?;
        result
            .rows
            .first()
            .map(|row| row.text(0))
            .ok_or_else(|| CoreError::key_not_found(key))
    }

    /// Reads a setting, returning `None` if it was never set.
    pub fn get_optional(&self, key: &str) -> CoreResult<Option<String>> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(CoreError::KeyNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stores a replica-local setting. Nothing is logged.
    pub fn set(&mut self, key: &str, value: &str) -> CoreResult<()> {
        self.exec_without_log(DELETE, &[Value::from(key)])?;
        self.exec_without_log(INSERT, &[Value::from(key), Value::from(value)])?;
        Ok(())
    }

    /// Stores a setting through the log so it replicates.
    pub fn set_global(&mut self, key: &str, value: &str) -> CoreResult<()> {
        self.exec(DELETE, &[Value::from(key)])?;
        self.exec(INSERT, &[Value::from(key), Value::from(value)])?;
        Ok(())
    }
}
