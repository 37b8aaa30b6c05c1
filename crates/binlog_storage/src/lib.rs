//! # binlog storage
//!
//! Byte-table layer for binlog, backed by LMDB through `heed`.
//!
//! Tables are **opaque byte stores**: keys and values are plain byte
//! slices, ordered bytewise. The core crate owns every key and value
//! encoding; this crate only knows about environments, named tables
//! and short-lived transactions.
//!
//! ## Design Principles
//!
//! - One [`Environment`] per directory, holding any number of named [`Table`]s
//! - Every transaction is opened and closed within a single call
//! - Table handles are cached per environment and reused
//! - `heed` errors are classified into [`StorageError`] variants callers can match on
//!
//! ## Example
//!
//! ```no_run
//! use binlog_storage::{Environment, EnvOptions};
//! use std::path::Path;
//!
//! let env = Environment::open(Path::new("data"), &EnvOptions::default()).unwrap();
//! let table = env.create_table("entries").unwrap();
//!
//! let mut txn = env.write_txn().unwrap();
//! table.put(&mut txn, b"key", b"value").unwrap();
//! txn.commit().unwrap();
//!
//! let txn = env.read_txn().unwrap();
//! assert_eq!(table.get(&txn, b"key").unwrap(), Some(b"value".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod env;
mod error;
mod table;

pub use env::{EnvOptions, Environment};
pub use error::{StorageError, StorageResult};
pub use heed::{RoTxn, RwTxn};
pub use table::{Pair, Table};
