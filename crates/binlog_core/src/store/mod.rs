//! The two LMDB environments backing a log.
//!
//! - `data`: entries, the position counter and index postings
//! - `readers`: committed registries, the reader catalog and search hints

mod data;
mod readers;

pub use data::{DataStore, EntryCursor, ENTRIES_TABLE, MAX_INDEXES, META_TABLE};
pub use readers::{lineage, validate_name, ReaderStore, CATALOG_TABLE, HINTS_TABLE, SEGMENTS_TABLE};

use crate::config::LogConfig;
use crate::error::CoreResult;
use std::path::Path;

/// Directory of the data environment under a log path.
pub const DATA_DIR: &str = "data";
/// Directory of the readers environment under a log path.
pub const READERS_DIR: &str = "readers";

/// Both environments of an open log.
#[derive(Debug)]
pub struct Stores {
    /// Entries and indexes.
    pub data: DataStore,
    /// Reader state.
    pub readers: ReaderStore,
}

impl Stores {
    /// Opens both environments under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if either environment cannot be opened.
    pub fn open(path: &Path, config: &LogConfig) -> CoreResult<Self> {
        Ok(Self {
            data: DataStore::open(&path.join(DATA_DIR), config)?,
            readers: ReaderStore::open(&path.join(READERS_DIR), config)?,
        })
    }
}
