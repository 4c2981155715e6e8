//! Shared view of the sync listener's current port.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// The port the sync listener is bound to right now.
///
/// Written only by the listener loop, which picks a new ephemeral port on
/// every restart. Read by the sync engine when it announces itself to the
/// discovery service. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct ListenerPort(Arc<AtomicU16>);

impl ListenerPort {
    /// Creates a handle with no listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current port, or `None` while no listener is bound.
    #[must_use]
    pub fn get(&self) -> Option<u16> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    /// Publishes a newly bound port.
    pub fn publish(&self, port: u16) {
        self.0.store(port, Ordering::Release);
    }

    /// Marks the listener as down.
    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}
