//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// `EACCES`, returned by LMDB when writing through a read-only environment.
const EACCES: i32 = 13;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write was attempted on a read-only environment.
    #[error("environment is read-only")]
    ReadOnly,

    /// A no-overwrite insert hit an existing key.
    #[error("key already exists")]
    KeyExists,

    /// The memory map is full.
    #[error("environment map is full")]
    MapFull,

    /// The environment is being closed by another handle.
    #[error("environment is closing")]
    Closing,

    /// Any other LMDB failure.
    #[error("lmdb error: {0}")]
    Lmdb(heed::Error),
}

impl StorageError {
    /// Returns true if the error means the environment cannot be written.
    ///
    /// Read paths use this to turn a read-only store into an empty stream.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        match self {
            Self::ReadOnly => true,
            Self::Io(err) => err.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

impl From<heed::Error> for StorageError {
    fn from(err: heed::Error) -> Self {
        match err {
            heed::Error::Io(io) if io.kind() == io::ErrorKind::PermissionDenied => Self::ReadOnly,
            heed::Error::Io(io) => Self::Io(io),
            heed::Error::Mdb(heed::MdbError::KeyExist) => Self::KeyExists,
            heed::Error::Mdb(heed::MdbError::MapFull) => Self::MapFull,
            heed::Error::Mdb(heed::MdbError::Other(code)) if code == EACCES => Self::ReadOnly,
            heed::Error::DatabaseClosing => Self::Closing,
            other => Self::Lmdb(other),
        }
    }
}
