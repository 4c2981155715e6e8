//! # SyncDB Codec
//!
//! Value type and statement encoding for SyncDB.
//!
//! Every write captured by the transaction log is stored as a
//! [`Statement`]: the SQL text plus its ordered parameters. The encoded
//! form is JSON and is shared by the local log and the sync wire format,
//! so replicas must produce and accept exactly the same bytes.
//!
//! ## Usage
//!
//! ```
//! use syncdb_codec::{Statement, Value};
//!
//! let stmt = Statement::new("insert into foo values (NULL, ?)", vec![Value::from("teste")]);
//! let json = stmt.encode().unwrap();
//! assert_eq!(json, r#"{"sql":"insert into foo values (NULL, ?)","params":["teste"]}"#);
//!
//! let decoded = Statement::decode(&json).unwrap();
//! assert_eq!(stmt, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod statement;
mod value;

pub use error::{CodecError, CodecResult};
pub use statement::Statement;
pub use value::Value;
