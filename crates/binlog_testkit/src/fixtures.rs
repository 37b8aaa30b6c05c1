//! Test fixtures and log helpers.
//!
//! Provides convenience functions for setting up test logs
//! and common test scenarios.

use binlog_core::{Connection, ConnectionRegistry, Entry, IndexKind, LogConfig};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Configuration used by the fixtures: a small map, and optional
/// indexes on `kind` (text) and `idx` (numeric).
pub fn test_config() -> LogConfig {
    LogConfig::new()
        .map_size(16 * 1024 * 1024)
        .optional_index("kind", IndexKind::Text)
        .optional_index("idx", IndexKind::Numeric)
}

/// A test log with automatic cleanup.
pub struct TestLog {
    /// The open connection.
    pub conn: Connection,
    registry: ConnectionRegistry,
    config: LogConfig,
    path: PathBuf,
    // Dropped last, after the connection released the environments.
    _temp_dir: TempDir,
}

impl TestLog {
    /// Creates an empty log with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates an empty log with `config`.
    pub fn with_config(config: LogConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("log");
        let registry = ConnectionRegistry::new();
        let conn = registry
            .open(&path, config.clone())
            .expect("Failed to open log");
        Self {
            conn,
            registry,
            config,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the log directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the connection registry the log was opened through.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Closes the connection and opens the log again.
    pub fn reopen(&mut self) {
        let config = self.config.clone();
        self.reopen_with(config);
    }

    /// Closes the connection and opens the log again without write access.
    pub fn reopen_read_only(&mut self) {
        let config = self.config.clone().read_only(true);
        self.reopen_with(config);
    }

    fn reopen_with(&mut self, config: LogConfig) {
        self.conn.close().expect("Failed to close log");
        self.conn = self
            .registry
            .open(&self.path, config)
            .expect("Failed to reopen log");
    }

    /// Appends `count` entries with fields `idx = i` and `kind` set to
    /// `"even"` or `"odd"`.
    pub fn fill(&self, count: i64) {
        let entries = (0..count).map(|i| {
            Entry::default()
                .with("idx", i)
                .with("kind", if i % 2 == 0 { "even" } else { "odd" })
        });
        self.conn
            .bulk_create(entries)
            .expect("Failed to create entries");
    }
}

impl Default for TestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestLog {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

/// Runs a test with a temporary, empty log.
///
/// # Example
///
/// ```rust,ignore
/// use binlog_testkit::with_temp_log;
///
/// #[test]
/// fn my_test() {
///     with_temp_log(|log| {
///         log.register_reader("r").unwrap();
///     });
/// }
/// ```
pub fn with_temp_log<F, R>(f: F) -> R
where
    F: FnOnce(&Connection) -> R,
{
    let log = TestLog::new();
    f(&log.conn)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a log holding `count` entries, see [`TestLog::fill`].
    pub fn populated_log(count: i64) -> TestLog {
        let log = TestLog::new();
        log.fill(count);
        log
    }

    /// Creates a populated log with the given readers registered.
    pub fn log_with_readers(count: i64, readers: &[&str]) -> TestLog {
        let log = populated_log(count);
        for name in readers {
            log.register_reader(name).expect("Failed to register reader");
        }
        log
    }
}
