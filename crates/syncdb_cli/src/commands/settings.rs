//! Setting commands.

use super::{open, CommandResult};
use std::path::Path;
use syncdb_core::Store;

/// Reads `key` and renders it as `key = value`.
pub fn get(path: &Path, key: &str) -> CommandResult<String> {
    get_in(&open(path)?, key)
}

/// Writes `key`, through the log when `global` is set.
pub fn set(path: &Path, key: &str, value: &str, global: bool) -> CommandResult<String> {
    set_in(&open(path)?, key, value, global)
}

pub(crate) fn get_in(store: &Store, key: &str) -> CommandResult<String> {
    let value = store.transaction(|tx| tx.get(key))?;
    Ok(format!("{key} = {value}"))
}

pub(crate) fn set_in(store: &Store, key: &str, value: &str, global: bool) -> CommandResult<String> {
    store.transaction(|tx| {
        if global {
            tx.set_global(key, value)
        } else {
            tx.set(key, value)
        }
    })?;
    Ok(format!("{key} = {value}"))
}
