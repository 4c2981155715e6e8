//! # SyncDB Sync Protocol
//!
//! Wire messages exchanged between SyncDB replicas and with the discovery
//! service.
//!
//! This crate provides:
//! - [`TransactionBundle`], the JSON form of a transaction and its statements
//! - [`DiffMessage`], the body of the exchange endpoint
//! - [`NodeInfo`] and [`DiscoveryRequest`] for peer discovery
//! - [`IdDiff`] for comparing transaction id sets
//! - [`ListenerPort`], the live port of the sync listener
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod bundle;
mod discovery;
mod error;
mod listener;
mod messages;
mod reconcile;

pub use bundle::{from_wire, to_wire, BundleStatement, TransactionBundle};
pub use discovery::{decode_peers, is_loopback, DiscoveryRequest, NodeInfo, PeerMap};
pub use error::{ProtocolError, ProtocolResult};
pub use listener::ListenerPort;
pub use messages::{decode_bundles, decode_ids, DiffMessage};
pub use reconcile::{parse_ids, IdDiff};

/// Path of the id listing endpoint.
pub const TRANSACTIONS_PATH: &str = "/transactions";

/// Path of the exchange endpoint.
pub const DIFFS_PATH: &str = "/diffs";
