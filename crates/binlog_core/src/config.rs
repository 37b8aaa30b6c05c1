//! Log configuration.

use crate::index::{IndexKind, IndexSpec};

/// Configuration for opening a log.
///
/// Two connections to the same path must use equal configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether to create the log directories if they don't exist.
    pub create_if_missing: bool,

    /// Whether to open both environments read-only.
    pub read_only: bool,

    /// Memory map size of each environment, in bytes.
    pub map_size: usize,

    /// Number of entries deleted per transaction by [`crate::Connection::purge`].
    pub purge_chunk_size: usize,

    /// Declared secondary indexes, in declaration order.
    ///
    /// A log records the indexes it was created with and refuses to open
    /// with a different set.
    pub indexes: Vec<IndexSpec>,

    /// Whether to use the indexes recorded in the log instead of `indexes`.
    pub adopt_indexes: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            read_only: false,
            map_size: 1024 * 1024 * 1024, // 1 GB
            purge_chunk_size: 1000,
            indexes: Vec::new(),
            adopt_indexes: false,
        }
    }
}

impl LogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the log if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to open read-only.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets the memory map size of each environment.
    #[must_use]
    pub const fn map_size(mut self, size: usize) -> Self {
        self.map_size = size;
        self
    }

    /// Sets the purge chunk size.
    #[must_use]
    pub const fn purge_chunk_size(mut self, size: usize) -> Self {
        self.purge_chunk_size = size;
        self
    }

    /// Sets whether to open with the indexes recorded in the log.
    ///
    /// `indexes` is then only used for a log that has none recorded yet.
    #[must_use]
    pub const fn adopt_indexes(mut self, value: bool) -> Self {
        self.adopt_indexes = value;
        self
    }

    /// Declares a mandatory index on `field`.
    ///
    /// Redeclaring a field replaces its previous declaration.
    #[must_use]
    pub fn index(self, field: impl Into<String>, kind: IndexKind) -> Self {
        self.declare(IndexSpec::mandatory(field, kind))
    }

    /// Declares an optional index on `field`.
    #[must_use]
    pub fn optional_index(self, field: impl Into<String>, kind: IndexKind) -> Self {
        self.declare(IndexSpec::optional(field, kind))
    }

    /// Returns the declared index for `field`.
    #[must_use]
    pub fn index_for(&self, field: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|spec| spec.field == field)
    }

    fn declare(mut self, spec: IndexSpec) -> Self {
        match self.indexes.iter_mut().find(|s| s.field == spec.field) {
            Some(existing) => *existing = spec,
            None => self.indexes.push(spec),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = LogConfig::default();
        assert!(config.create_if_missing);
        assert!(!config.read_only);
        assert!(config.indexes.is_empty());
        assert!(!config.adopt_indexes);
    }

    #[test]
    fn builder_pattern() {
        let config = LogConfig::new()
            .read_only(true)
            .purge_chunk_size(10)
            .index("kind", IndexKind::Text)
            .optional_index("at", IndexKind::Datetime);

        assert!(config.read_only);
        assert_eq!(config.purge_chunk_size, 10);
        assert_eq!(config.indexes.len(), 2);
        assert!(config.index_for("kind").unwrap().mandatory);
        assert!(!config.index_for("at").unwrap().mandatory);
    }

    #[test]
    fn redeclared_index_replaces() {
        let config = LogConfig::new()
            .index("n", IndexKind::Text)
            .optional_index("n", IndexKind::Numeric);
        assert_eq!(config.indexes.len(), 1);
        assert_eq!(config.index_for("n").unwrap().kind, IndexKind::Numeric);
    }

    #[test]
    fn equality_covers_indexes() {
        let a = LogConfig::new().index("k", IndexKind::Text);
        let b = LogConfig::new().optional_index("k", IndexKind::Text);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
