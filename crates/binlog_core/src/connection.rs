//! # Connections
//!
//! A [`Connection`] is the handle applications use to write entries,
//! manage readers and purge. Handles are handed out by a
//! [`ConnectionRegistry`], which reference counts the open environments
//! per path: the first open of a path opens them, later opens share them,
//! and the last close releases them.
//!
//! ## Design Principles
//!
//! - A handle is bound to the thread and process that opened it; every
//!   operation checks both and fails with [`CoreError::BadUsage`] otherwise
//! - The registry is an explicit value, not process-wide state
//! - After a fork the child calls [`ConnectionRegistry::reset`] and opens afresh

use crate::config::LogConfig;
use crate::entry::{AckTarget, Entry};
use crate::error::{CoreError, CoreResult};
use crate::index::IndexSpec;
use crate::purge::{self, PurgeStats};
use crate::reader::Reader;
use crate::store::Stores;
use crate::types::Position;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

/// Environments shared by every handle open on one path.
#[derive(Debug)]
struct Shared {
    path: PathBuf,
    config: LogConfig,
    pid: u32,
    stores: Stores,
}

#[derive(Debug)]
struct Slot {
    shared: Arc<Shared>,
    refs: usize,
}

/// Reference-counted registry of open logs.
///
/// Cloning the registry yields another view of the same set of open logs.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    slots: Arc<Mutex<HashMap<PathBuf, Slot>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the log at `path`.
    ///
    /// If the path is already open the environments are shared and the
    /// reference count incremented. Paths are compared in canonical form,
    /// so any spelling of the same directory shares one set of environments.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ConfigMismatch`] if the path is open with a different
    ///   configuration, or the declared indexes differ from the recorded ones
    /// - a storage error if the environments cannot be opened
    pub fn open(&self, path: impl AsRef<Path>, config: LogConfig) -> CoreResult<Connection> {
        let path = prepare(path.as_ref(), &config)?;
        let mut slots = self.slots.lock();

        if let Some(slot) = slots.get_mut(&path) {
            if slot.shared.config != config {
                return Err(CoreError::ConfigMismatch);
            }
            slot.refs += 1;
            debug!(path = %path.display(), refs = slot.refs, "connection shared");
            return Ok(Connection::new(Arc::clone(&slot.shared), self.clone()));
        }

        let stores = Stores::open(&path, &config)?;
        let shared = Arc::new(Shared {
            path: path.clone(),
            config,
            pid: std::process::id(),
            stores,
        });
        slots.insert(
            path.clone(),
            Slot {
                shared: Arc::clone(&shared),
                refs: 1,
            },
        );
        info!(path = %path.display(), "log opened");
        Ok(Connection::new(shared, self.clone()))
    }

    /// Returns true if `path` has open handles.
    #[must_use]
    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        self.slots.lock().contains_key(&canonical(path.as_ref()))
    }

    /// Number of open handles on `path`.
    #[must_use]
    pub fn ref_count(&self, path: impl AsRef<Path>) -> usize {
        self.slots.lock().get(&canonical(path.as_ref())).map_or(0, |slot| slot.refs)
    }

    /// Forgets every open log without closing its environments.
    ///
    /// Meant for the child side of a fork: the inherited environments
    /// belong to the parent and must not be closed from the child.
    pub fn reset(&self) {
        let drained: Vec<Slot> = self.slots.lock().drain().map(|(_, slot)| slot).collect();
        for slot in drained {
            std::mem::forget(slot.shared);
        }
        info!("connection registry reset");
    }

    fn release(&self, shared: Arc<Shared>) {
        let mut slots = self.slots.lock();
        let evict = match slots.get_mut(&shared.path) {
            Some(slot) if Arc::ptr_eq(&slot.shared, &shared) => {
                slot.refs -= 1;
                slot.refs == 0
            }
            // Stale handle from before a reset.
            _ => false,
        };
        if evict {
            slots.remove(&shared.path);
            info!(path = %shared.path.display(), "log closed");
        }
    }
}

/// Canonical form of `path`, or `path` itself if it doesn't resolve.
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Creates the log directory when `config` allows and returns its canonical path.
fn prepare(path: &Path, config: &LogConfig) -> CoreResult<PathBuf> {
    if !path.exists() && config.create_if_missing && !config.read_only {
        std::fs::create_dir_all(path)?;
    }
    Ok(canonical(path))
}

/// A handle on an open log.
pub struct Connection {
    shared: Option<Arc<Shared>>,
    thread: ThreadId,
    registry: ConnectionRegistry,
}

impl Connection {
    fn new(shared: Arc<Shared>, registry: ConnectionRegistry) -> Self {
        Self {
            shared: Some(shared),
            thread: thread::current().id(),
            registry,
        }
    }

    fn shared(&self) -> CoreResult<&Shared> {
        let shared = self
            .shared
            .as_deref()
            .ok_or_else(|| CoreError::bad_usage("connection is closed"))?;
        if shared.pid != std::process::id() {
            return Err(CoreError::bad_usage("connection belongs to another process"));
        }
        if self.thread != thread::current().id() {
            return Err(CoreError::bad_usage("connection belongs to another thread"));
        }
        Ok(shared)
    }

    /// Checks that the handle is usable from here.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadUsage`] if the handle is closed or was
    /// opened by another thread or process.
    pub fn check(&self) -> CoreResult<()> {
        self.shared().map(|_| ())
    }

    pub(crate) fn stores(&self) -> CoreResult<&Stores> {
        Ok(&self.shared()?.stores)
    }

    /// Path of the log.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadUsage`] if the handle is not usable.
    pub fn path(&self) -> CoreResult<&Path> {
        Ok(&self.shared()?.path)
    }

    /// Configuration the log was opened with.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadUsage`] if the handle is not usable.
    pub fn config(&self) -> CoreResult<&LogConfig> {
        Ok(&self.shared()?.config)
    }

    /// Indexes the log was opened with.
    ///
    /// These are the recorded indexes when the configuration adopts them.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadUsage`] if the handle is not usable.
    pub fn indexes(&self) -> CoreResult<Vec<IndexSpec>> {
        Ok(self.stores()?.data.indexes().cloned().collect())
    }

    /// Returns true once [`Connection::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_none()
    }

    /// Returns true if both handles share the same environments.
    #[must_use]
    pub fn shares_handle_with(&self, other: &Connection) -> bool {
        match (&self.shared, &other.shared) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Releases this handle.
    ///
    /// The environments are closed when the last handle on the path is released.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadUsage`] if the handle is already closed or
    /// belongs to another thread or process.
    pub fn close(&mut self) -> CoreResult<()> {
        self.check()?;
        if let Some(shared) = self.shared.take() {
            self.registry.release(shared);
        }
        Ok(())
    }

    // ========================================================================
    // Entries
    // ========================================================================

    /// Stores `entry` at the next position.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Integrity`] if the position is already taken
    /// - [`CoreError::InvalidValue`] if a mandatory index field is missing
    pub fn create(&self, entry: Entry) -> CoreResult<Entry> {
        self.stores()?.data.create(entry.into_fields())
    }

    /// Stores `entries` at consecutive positions in one transaction.
    ///
    /// # Errors
    ///
    /// - [`CoreError::PartialBulkCreate`] if a position is already taken
    /// - [`CoreError::InvalidValue`] if a mandatory index field is missing
    ///
    /// Nothing is stored when an error is returned.
    pub fn bulk_create(&self, entries: impl IntoIterator<Item = Entry>) -> CoreResult<Vec<Entry>> {
        let records = entries.into_iter().map(Entry::into_fields).collect();
        self.stores()?.data.bulk_create(records)
    }

    /// Stores an opaque blob as the `data` field of the next entry.
    ///
    /// # Errors
    ///
    /// See [`Connection::create`].
    pub fn append(&self, raw: &[u8]) -> CoreResult<Position> {
        self.stores()?.data.append(raw)
    }

    /// Reads the entry at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get(&self, position: Position) -> CoreResult<Option<Entry>> {
        self.stores()?.data.get(position)
    }

    /// Number of live entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn len(&self) -> CoreResult<u64> {
        self.stores()?.data.len()
    }

    /// Returns true if the log holds no live entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Position of the first live entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn first_position(&self) -> CoreResult<Option<Position>> {
        self.stores()?.data.first_position()
    }

    /// Position of the last live entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn last_position(&self) -> CoreResult<Option<Position>> {
        self.stores()?.data.last_position()
    }

    // ========================================================================
    // Readers
    // ========================================================================

    /// Registers `name` and its missing ancestors.
    ///
    /// Returns true if any reader was created.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidReaderName`] for malformed names.
    pub fn register_reader(&self, name: &str) -> CoreResult<bool> {
        self.stores()?.readers.register(name)
    }

    /// Unregisters `name` and its descendants.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReaderDoesNotExist`] if `name` is not registered.
    pub fn unregister_reader(&self, name: &str) -> CoreResult<()> {
        self.stores()?.readers.unregister(name)
    }

    /// Registers `destination` with the committed state of `source`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ReaderDoesNotExist`] if `source` is not registered
    /// - [`CoreError::ReaderExists`] if `destination` is registered
    pub fn clone_reader(&self, source: &str, destination: &str) -> CoreResult<()> {
        self.stores()?.readers.clone_reader(source, destination)
    }

    /// Registered reader names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn list_readers(&self) -> CoreResult<Vec<String>> {
        self.stores()?.readers.list()
    }

    /// Opens a reader.
    ///
    /// `None` gives an anonymous reader, which sees every entry and cannot
    /// acknowledge.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReaderDoesNotExist`] if `name` is not registered.
    pub fn reader(&self, name: Option<&str>) -> CoreResult<Reader<'_>> {
        Reader::open(self, name)
    }

    /// Deletes the entry at `target` if every registered reader has
    /// committed its acknowledgment.
    ///
    /// Returns false if some reader hasn't, or if the entry is already gone.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReaderDoesNotExist`] if no reader is registered.
    pub fn remove(&self, target: impl AckTarget) -> CoreResult<bool> {
        let position = target.ack_position()?;
        let stores = self.stores()?;
        let readers = stores.readers.list()?;
        if readers.is_empty() {
            return Err(CoreError::reader_does_not_exist("any reader"));
        }
        for name in &readers {
            if !stores.readers.segments(name)?.contains(position)? {
                return Ok(false);
            }
        }
        stores.data.remove(position)
    }

    /// Deletes every entry acknowledged by all registered readers, using
    /// the configured chunk size.
    ///
    /// # Errors
    ///
    /// Returns an error if a read or a delete fails.
    pub fn purge(&self) -> CoreResult<PurgeStats> {
        let chunk_size = self.config()?.purge_chunk_size;
        self.purge_chunked(chunk_size)
    }

    /// Like [`Connection::purge`], deleting at most `chunk_size` entries
    /// per transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidValue`] if `chunk_size` is zero.
    pub fn purge_chunked(&self, chunk_size: usize) -> CoreResult<PurgeStats> {
        purge::purge(self.stores()?, chunk_size)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.shared.as_ref().map(|s| &s.path))
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        if shared.pid != std::process::id() {
            // Inherited across a fork: the environments are the parent's.
            std::mem::forget(shared);
            return;
        }
        if self.thread != thread::current().id() {
            warn!(path = %shared.path.display(), "connection dropped on a foreign thread");
        }
        self.registry.release(shared);
    }
}
