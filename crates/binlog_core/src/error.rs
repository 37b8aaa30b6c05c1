//! Error types for binlog core.

use crate::types::Position;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in binlog core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] binlog_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] binlog_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A handle was used after close, from another thread or from another process.
    #[error("bad usage: {message}")]
    BadUsage {
        /// Description of the misuse.
        message: String,
    },

    /// A path is already open with a different configuration, or the
    /// declared indexes differ from the ones the log records.
    #[error("configuration conflicts with the open or recorded log")]
    ConfigMismatch,

    /// An entry position was already taken.
    #[error("integrity error: position {position} already exists")]
    Integrity {
        /// The colliding position.
        position: Position,
    },

    /// A bulk insert collided part way through and was rolled back.
    #[error("integrity error: bulk create stored {stored} of {requested} entries before a collision")]
    PartialBulkCreate {
        /// Entries inserted before the collision.
        stored: usize,
        /// Entries requested.
        requested: usize,
    },

    /// The named reader is not registered.
    #[error("reader does not exist: {name}")]
    ReaderDoesNotExist {
        /// Name of the reader.
        name: String,
    },

    /// The destination reader of a clone is already registered.
    #[error("reader already exists: {name}")]
    ReaderExists {
        /// Name of the reader.
        name: String,
    },

    /// A reader name is empty or has empty dotted components.
    #[error("invalid reader name: {name:?}")]
    InvalidReaderName {
        /// The rejected name.
        name: String,
    },

    /// An index or slice bound is outside the log.
    #[error("index out of range: {index}")]
    IndexOutOfRange {
        /// The requested index.
        index: i64,
    },

    /// A value was rejected.
    #[error("invalid value: {message}")]
    InvalidValue {
        /// Description of why the value is invalid.
        message: String,
    },

    /// Anonymous readers cannot acknowledge entries.
    #[error("anonymous readers cannot acknowledge entries")]
    AnonymousReader,

    /// Combined iterators walk in different directions.
    #[error("cannot combine iterators walking in different directions")]
    DirectionMismatch,

    /// Persisted data is malformed.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },
}

impl CoreError {
    /// Creates a bad usage error.
    pub fn bad_usage(message: impl Into<String>) -> Self {
        Self::BadUsage {
            message: message.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Creates a reader does not exist error.
    pub fn reader_does_not_exist(name: impl Into<String>) -> Self {
        Self::ReaderDoesNotExist { name: name.into() }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Returns true if this is a read-only or write-conflict error of the store.
    ///
    /// Reader read paths treat these as the end of the stream.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_read_only())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binlog_storage::StorageError;

    #[test]
    fn read_only_storage_errors_are_detected() {
        assert!(CoreError::from(StorageError::ReadOnly).is_read_only());
        assert!(!CoreError::from(StorageError::MapFull).is_read_only());
        assert!(!CoreError::invalid_value("x").is_read_only());
    }

    #[test]
    fn messages_name_the_problem() {
        let err = CoreError::PartialBulkCreate {
            stored: 5,
            requested: 10,
        };
        assert!(err.to_string().contains("5 of 10"));

        let err = CoreError::reader_does_not_exist("a.b");
        assert_eq!(err.to_string(), "reader does not exist: a.b");
    }
}
