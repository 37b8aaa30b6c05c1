//! # binlog core
//!
//! An embedded, append-only event log with durable per-reader
//! acknowledgment tracking, built on LMDB.
//!
//! Producers append immutable entries at increasing [`Position`]s.
//! Independent named [`Reader`]s walk the log and acknowledge the
//! positions they have consumed; an entry is reclaimed by
//! [`Connection::purge`] once every registered reader acknowledged it.
//!
//! This crate provides:
//! - [`Segment`] and [`Registry`], the interval-set algebra of acknowledgments
//! - [`IterSeek`], seekable position streams with [`And`] / [`Or`] combinators
//! - registries read straight from disk ([`db_registry`])
//! - [`ConnectionRegistry`] and [`Connection`], thread- and process-bound handles
//! - [`Reader`], with hierarchical names, filters, search hints and slicing
//!
//! ## Example
//!
//! ```no_run
//! use binlog_core::{ConnectionRegistry, Entry, LogConfig};
//!
//! let registry = ConnectionRegistry::new();
//! let conn = registry.open("events", LogConfig::new()).unwrap();
//!
//! conn.create(Entry::default().with("kind", "signup")).unwrap();
//! conn.register_reader("mailer").unwrap();
//!
//! let reader = conn.reader(Some("mailer")).unwrap();
//! for entry in reader.iter().unwrap() {
//!     let entry = entry.unwrap();
//!     reader.ack(&entry).unwrap();
//! }
//! reader.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
pub mod db_registry;
mod entry;
mod error;
mod index;
pub mod iterseek;
mod purge;
mod reader;
mod registry;
mod segment;
pub mod store;
mod types;

pub use binlog_codec::{Fields, Value};
pub use config::LogConfig;
pub use connection::{Connection, ConnectionRegistry};
pub use entry::{AckTarget, Entry};
pub use error::{CoreError, CoreResult};
pub use index::{IndexKind, IndexSpec, PostingCursor};
pub use iterseek::{And, BoxedSeek, IterSeek, Or};
pub use purge::PurgeStats;
pub use reader::{Entries, Filter, Reader, Slice, SliceEntries};
pub use registry::Registry;
pub use segment::Segment;
pub use types::{Direction, Position, MAX, MIN};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
