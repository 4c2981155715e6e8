//! # SyncDB Sync Server
//!
//! HTTP listener through which peers pull and push transactions.
//!
//! This crate provides:
//! - `GET /transactions`: the JSON array of local transaction ids
//! - `POST /diffs`: applies the peer's `have` bundles, answers with the
//!   bundles for its `want` ids
//! - A listener loop that rebinds on a fresh ephemeral port after any
//!   failure and publishes the live port for discovery
//!
//! Every failure, including malformed input, is answered with `404` and an
//! empty JSON array.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::{ServerHandle, SyncServer};
