//! CLI command implementations.

pub mod run;
pub mod settings;
pub mod sql;

use std::path::Path;
use syncdb_core::{Store, StoreConfig};

pub(crate) type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

pub(crate) fn open(path: &Path) -> CommandResult<Store> {
    Ok(Store::open(StoreConfig::new(path))?)
}
