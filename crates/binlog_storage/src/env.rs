//! LMDB environments.

use crate::error::{StorageError, StorageResult};
use crate::table::Table;
use heed::types::Bytes;
use heed::{EnvFlags, EnvOpenOptions, RoTxn, RwTxn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Options for opening an [`Environment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOptions {
    /// Size of the memory map in bytes (upper bound of the store size).
    pub map_size: usize,
    /// Maximum number of named tables.
    pub max_tables: u32,
    /// Open without write access.
    pub read_only: bool,
    /// Create the directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            map_size: 1024 * 1024 * 1024, // 1 GB
            max_tables: 16,
            read_only: false,
            create_if_missing: true,
        }
    }
}

/// A directory-backed LMDB environment holding named byte tables.
///
/// Cloning is cheap: clones share the underlying environment and the
/// table handle cache. The environment is closed when the last clone
/// is dropped.
#[derive(Clone)]
pub struct Environment {
    env: heed::Env,
    path: PathBuf,
    read_only: bool,
    tables: Arc<Mutex<HashMap<String, Table>>>,
}

impl Environment {
    /// Opens (or creates) the environment stored in `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and cannot or may not be created
    /// - LMDB refuses to open the environment
    pub fn open(path: &Path, options: &EnvOptions) -> StorageResult<Self> {
        if !path.exists() {
            if options.create_if_missing && !options.read_only {
                std::fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("environment does not exist: {}", path.display()),
                )));
            }
        }

        if !path.is_dir() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {}", path.display()),
            )));
        }

        let env = open_env(path, options)?;
        debug!(path = %path.display(), read_only = options.read_only, "environment opened");

        Ok(Self {
            env,
            path: path.to_path_buf(),
            read_only: options.read_only,
            tables: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Returns the directory of this environment.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the environment was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Begins a read transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if LMDB cannot start the transaction.
    pub fn read_txn(&self) -> StorageResult<RoTxn<'_>> {
        Ok(self.env.read_txn()?)
    }

    /// Begins a write transaction.
    ///
    /// Blocks while another writer (in this or another process) holds
    /// the write lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] on a read-only environment.
    pub fn write_txn(&self) -> StorageResult<RwTxn<'_>> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        Ok(self.env.write_txn()?)
    }

    /// Creates the named table if needed and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is read-only or the table
    /// limit is reached.
    pub fn create_table(&self, name: &str) -> StorageResult<Table> {
        if let Some(table) = self.cached(name) {
            return Ok(table);
        }

        let mut txn = self.write_txn()?;
        let db = self
            .env
            .database_options()
            .types::<Bytes, Bytes>()
            .name(name)
            .create(&mut txn)?;
        txn.commit()?;

        let table = Table::new(db);
        self.tables.lock().insert(name.to_string(), table);
        Ok(table)
    }

    /// Opens the named table, returning `None` if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if LMDB fails to look the table up.
    pub fn open_table(&self, name: &str) -> StorageResult<Option<Table>> {
        if let Some(table) = self.cached(name) {
            return Ok(Some(table));
        }

        let txn = self.env.read_txn()?;
        let db = self
            .env
            .database_options()
            .types::<Bytes, Bytes>()
            .name(name)
            .open(&txn)?;

        match db {
            Some(db) => {
                // Handles opened in a read transaction only outlive it once committed.
                txn.commit()?;
                let table = Table::new(db);
                self.tables.lock().insert(name.to_string(), table);
                Ok(Some(table))
            }
            None => Ok(None),
        }
    }

    /// Flushes the environment to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        Ok(self.env.force_sync()?)
    }

    fn cached(&self, name: &str) -> Option<Table> {
        self.tables.lock().get(name).copied()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

#[allow(unsafe_code)]
fn open_env(path: &Path, options: &EnvOptions) -> StorageResult<heed::Env> {
    let mut builder = EnvOpenOptions::new();
    builder
        .map_size(options.map_size)
        .max_dbs(options.max_tables);

    // SAFETY: the environment is opened once per path per process; the
    // connection registry in binlog_core shares it instead of reopening.
    let env = unsafe {
        if options.read_only {
            builder.flags(EnvFlags::READ_ONLY);
        }
        builder.open(path)?
    };
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small() -> EnvOptions {
        EnvOptions {
            map_size: 16 * 1024 * 1024,
            ..EnvOptions::default()
        }
    }

    #[test]
    fn open_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("env");

        let env = Environment::open(&path, &small()).unwrap();
        assert!(path.is_dir());
        assert_eq!(env.path(), path.as_path());
        assert!(!env.is_read_only());
    }

    #[test]
    fn open_missing_without_create_fails() {
        let dir = tempdir().unwrap();
        let options = EnvOptions {
            create_if_missing: false,
            ..small()
        };

        let result = Environment::open(&dir.path().join("missing"), &options);
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn open_table_missing_returns_none() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), &small()).unwrap();

        assert!(env.open_table("nope").unwrap().is_none());
    }

    #[test]
    fn created_table_is_found_again() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path(), &small()).unwrap();

        let table = env.create_table("things").unwrap();
        let mut txn = env.write_txn().unwrap();
        table.put(&mut txn, b"a", b"1").unwrap();
        txn.commit().unwrap();

        let again = env.open_table("things").unwrap().unwrap();
        let txn = env.read_txn().unwrap();
        assert_eq!(again.get(&txn, b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn read_only_environment_rejects_writes() {
        let dir = tempdir().unwrap();
        {
            let env = Environment::open(dir.path(), &small()).unwrap();
            env.create_table("things").unwrap();
        }

        let options = EnvOptions {
            read_only: true,
            ..small()
        };
        let env = Environment::open(dir.path(), &options).unwrap();
        assert!(env.is_read_only());
        assert!(matches!(env.write_txn(), Err(StorageError::ReadOnly)));
        assert!(env.open_table("things").unwrap().is_some());
    }
}
