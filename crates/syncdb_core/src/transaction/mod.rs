//! Transaction management.
//!
//! A store serializes all of its transactions behind one lock:
//! - **Read-write** transactions write a record, log every `exec` with a
//!   sequence number starting at 1, and drop the record on commit if
//!   nothing was logged.
//! - **Query-only** transactions write nothing and reject every write.
//!
//! Handles roll back when dropped, so the lock is released on every path.

mod handle;

pub use handle::Transaction;
