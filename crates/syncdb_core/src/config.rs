//! Store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file path, or `:memory:`.
    pub path: PathBuf,

    /// How long SQLite waits on a locked database file before failing.
    pub busy_timeout: Duration,

    /// Emit a debug event with the caller location on begin/commit/rollback.
    pub trace_transactions: bool,

    /// Generate a local node id on open if none is stored.
    pub generate_node_id: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(IN_MEMORY),
            busy_timeout: Duration::from_secs(5),
            trace_transactions: false,
            generate_node_id: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for the database at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Creates a configuration for a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Returns true if this configuration selects an in-memory database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }

    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether transaction boundaries are traced.
    #[must_use]
    pub const fn trace_transactions(mut self, value: bool) -> Self {
        self.trace_transactions = value;
        self
    }

    /// Sets whether a node id is generated on open.
    #[must_use]
    pub const fn generate_node_id(mut self, value: bool) -> Self {
        self.generate_node_id = value;
        self
    }
}
