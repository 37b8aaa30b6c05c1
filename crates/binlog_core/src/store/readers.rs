//! The readers environment: committed registries, the reader catalog and
//! search hints.
//!
//! The environment holds a fixed set of three tables whatever the number
//! of readers ever registered: rows of every reader share the segments
//! and hints tables, prefixed by the reader name and a zero byte.

use crate::config::LogConfig;
use crate::db_registry::{segment_key, segment_prefix, DiskSegments};
use crate::error::{CoreError, CoreResult};
use crate::registry::Registry;
use crate::segment::Segment;
use crate::types::{decode_position, position_key, Position};
use binlog_storage::{EnvOptions, Environment, RoTxn, Table};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Catalog of registered reader names.
pub const CATALOG_TABLE: &str = "__readers__";
/// Resume points of filtered acknowledgment scans.
pub const HINTS_TABLE: &str = "__hints__";
/// Committed registries of every reader.
pub const SEGMENTS_TABLE: &str = "__segments__";

/// Checks that `name` is non-empty and has no empty dotted component.
///
/// # Errors
///
/// Returns [`CoreError::InvalidReaderName`] otherwise.
pub fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || name.split('.').any(str::is_empty) || name.contains('\0') {
        return Err(CoreError::InvalidReaderName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// `"a.b.c"` yields `"a"`, `"a.b"`, `"a.b.c"`.
pub fn lineage(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices('.')
        .map(move |(i, _)| &name[..i])
        .chain(std::iter::once(name))
}

/// Returns true if `candidate` is `name` or one of its descendants.
fn in_subtree(candidate: &str, name: &str) -> bool {
    candidate
        .strip_prefix(name)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

fn hint_key(reader: &str, signature: &[u8]) -> Vec<u8> {
    let mut key = segment_prefix(reader);
    key.extend_from_slice(signature);
    key
}

/// Registered readers and their committed state.
#[derive(Debug)]
pub struct ReaderStore {
    env: Environment,
    // Bumped by every write to the segments table.
    generation: Arc<AtomicU64>,
}

impl ReaderStore {
    /// Opens the readers environment in `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment cannot be opened.
    pub fn open(path: &Path, config: &LogConfig) -> CoreResult<Self> {
        let options = EnvOptions {
            map_size: config.map_size,
            max_tables: 3,
            read_only: config.read_only,
            create_if_missing: config.create_if_missing,
        };
        let env = Environment::open(path, &options)?;
        if !config.read_only {
            for name in [CATALOG_TABLE, HINTS_TABLE, SEGMENTS_TABLE] {
                env.create_table(name)?;
            }
        }
        Ok(Self {
            env,
            generation: Arc::default(),
        })
    }

    /// Returns true if `name` is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn is_registered(&self, name: &str) -> CoreResult<bool> {
        let Some(catalog) = self.env.open_table(CATALOG_TABLE)? else {
            return Ok(false);
        };
        let txn = self.env.read_txn()?;
        Ok(catalog.get(&txn, name.as_bytes())?.is_some())
    }

    /// Registered reader names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn list(&self) -> CoreResult<Vec<String>> {
        let Some(catalog) = self.env.open_table(CATALOG_TABLE)? else {
            return Ok(Vec::new());
        };
        let txn = self.env.read_txn()?;
        catalog
            .scan(&txn)?
            .into_iter()
            .map(|(key, _)| {
                String::from_utf8(key).map_err(|_| CoreError::corruption("reader name is not UTF-8"))
            })
            .collect()
    }

    /// Registers `name` and every missing ancestor.
    ///
    /// Returns true if any reader was created.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidReaderName`] for malformed names, or a
    /// storage error if the environment is read-only.
    pub fn register(&self, name: &str) -> CoreResult<bool> {
        validate_name(name)?;

        let mut missing = Vec::new();
        for level in lineage(name) {
            if !self.is_registered(level)? {
                missing.push(level);
            }
        }
        if missing.is_empty() {
            return Ok(false);
        }

        let catalog = self.env.create_table(CATALOG_TABLE)?;
        let mut txn = self.env.write_txn()?;
        for level in &missing {
            catalog.put(&mut txn, level.as_bytes(), &[])?;
        }
        txn.commit().map_err(binlog_storage::StorageError::from)?;

        info!(reader = name, created = missing.len(), "reader registered");
        Ok(true)
    }

    /// Unregisters `name` together with its descendants and their hints.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReaderDoesNotExist`] if `name` is not registered.
    pub fn unregister(&self, name: &str) -> CoreResult<()> {
        if !self.is_registered(name)? {
            return Err(CoreError::reader_does_not_exist(name));
        }

        let doomed: Vec<String> = self
            .list()?
            .into_iter()
            .filter(|candidate| in_subtree(candidate, name))
            .collect();

        let catalog = self.env.create_table(CATALOG_TABLE)?;
        let hints = self.env.create_table(HINTS_TABLE)?;
        let segments = self.env.create_table(SEGMENTS_TABLE)?;
        let mut txn = self.env.write_txn()?;

        for reader in &doomed {
            let prefix = segment_prefix(reader);
            segments.delete_prefix(&mut txn, &prefix)?;
            hints.delete_prefix(&mut txn, &prefix)?;
            catalog.delete(&mut txn, reader.as_bytes())?;
        }
        txn.commit().map_err(binlog_storage::StorageError::from)?;
        self.bump();

        info!(reader = name, removed = doomed.len(), "reader unregistered");
        Ok(())
    }

    /// Registers `destination` with a copy of the committed registry of `source`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ReaderDoesNotExist`] if `source` is not registered
    /// - [`CoreError::ReaderExists`] if `destination` is already registered
    pub fn clone_reader(&self, source: &str, destination: &str) -> CoreResult<()> {
        if !self.is_registered(source)? {
            return Err(CoreError::reader_does_not_exist(source));
        }
        validate_name(destination)?;
        if self.is_registered(destination)? {
            return Err(CoreError::ReaderExists {
                name: destination.to_string(),
            });
        }

        let registry = self.load(source)?;
        self.register(destination)?;
        self.write(destination, &registry, &[])?;
        info!(source, destination, "reader cloned");
        Ok(())
    }

    /// Segment source over the committed registry of `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table lookup fails.
    pub fn segments(&self, name: &str) -> CoreResult<DiskSegments> {
        let table = self.env.open_table(SEGMENTS_TABLE)?;
        Ok(DiskSegments::new(
            self.env.clone(),
            table,
            name,
            Arc::clone(&self.generation),
        ))
    }

    /// Loads the committed registry of `name` into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored segments are malformed.
    pub fn load(&self, name: &str) -> CoreResult<Registry> {
        let Some(table) = self.env.open_table(SEGMENTS_TABLE)? else {
            return Ok(Registry::new());
        };
        let txn = self.env.read_txn()?;
        read_registry(&txn, table, name)
    }

    /// Persists `stored ∪ delta` as the registry of `name`, plus pending hints.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReaderDoesNotExist`] if `name` is not registered.
    pub fn commit(&self, name: &str, delta: &Registry, hints: &[([u8; 32], Position)]) -> CoreResult<()> {
        if !self.is_registered(name)? {
            return Err(CoreError::reader_does_not_exist(name));
        }
        self.write(name, delta, hints)
    }

    /// Last position visited by a filtered scan of `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn hint(&self, name: &str, signature: &[u8; 32]) -> CoreResult<Option<Position>> {
        let Some(hints) = self.env.open_table(HINTS_TABLE)? else {
            return Ok(None);
        };
        let txn = self.env.read_txn()?;
        hints
            .get(&txn, &hint_key(name, signature))?
            .map(|raw| decode_position(&raw))
            .transpose()
    }

    fn write(&self, name: &str, delta: &Registry, hints: &[([u8; 32], Position)]) -> CoreResult<()> {
        let table = self.env.create_table(SEGMENTS_TABLE)?;
        let hints_table = self.env.create_table(HINTS_TABLE)?;
        let mut txn = self.env.write_txn()?;

        let stored = read_registry(&txn, table, name)?;
        let merged = stored.union(delta);
        let changed = merged.segments() != stored.segments();
        if changed {
            let prefix = segment_prefix(name);
            table.delete_prefix(&mut txn, &prefix)?;
            for segment in merged.segments() {
                table.put(
                    &mut txn,
                    &segment_key(&prefix, segment.right()),
                    &position_key(segment.left()),
                )?;
            }
        }
        for (signature, position) in hints {
            hints_table.put(&mut txn, &hint_key(name, signature), &position_key(*position))?;
        }
        txn.commit().map_err(binlog_storage::StorageError::from)?;
        if changed {
            self.bump();
        }

        debug!(reader = name, segments = merged.segments().len(), "registry committed");
        Ok(())
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

fn read_registry(txn: &RoTxn, table: Table, name: &str) -> CoreResult<Registry> {
    let prefix = segment_prefix(name);
    let segments = table
        .scan_prefix(txn, &prefix)?
        .into_iter()
        .map(|(key, start)| {
            let end = key.get(prefix.len()..).unwrap_or_default();
            Segment::new(decode_position(&start)?, decode_position(end)?)
        })
        .collect::<CoreResult<Vec<_>>>()?;
    Registry::from_segments(segments)
        .map_err(|err| CoreError::corruption(format!("stored registry: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn store() -> (TempDir, ReaderStore) {
        let dir = tempdir().unwrap();
        let config = LogConfig::new().map_size(16 * 1024 * 1024);
        let store = ReaderStore::open(&dir.path().join("readers"), &config).unwrap();
        (dir, store)
    }

    fn registry(positions: &[Position]) -> Registry {
        let mut r = Registry::new();
        for &p in positions {
            r.add(p).unwrap();
        }
        r
    }

    #[test]
    fn lineage_lists_ancestors_first() {
        assert_eq!(lineage("a.b.c").collect::<Vec<_>>(), vec!["a", "a.b", "a.b.c"]);
        assert_eq!(lineage("solo").collect::<Vec<_>>(), vec!["solo"]);
    }

    #[test]
    fn names_are_validated() {
        assert!(validate_name("a.b").is_ok());
        for bad in ["", ".a", "a.", "a..b"] {
            assert!(matches!(validate_name(bad), Err(CoreError::InvalidReaderName { .. })));
        }
    }

    #[test]
    fn subtree_matching_respects_components() {
        assert!(in_subtree("a", "a"));
        assert!(in_subtree("a.b", "a"));
        assert!(!in_subtree("ab", "a"));
    }

    #[test]
    fn register_creates_ancestors_once() {
        let (_dir, store) = store();
        assert!(store.register("a.b.c").unwrap());
        assert!(!store.register("a.b.c").unwrap());
        assert!(!store.register("a.b").unwrap());
        assert!(store.register("a.d").unwrap());
        assert_eq!(store.list().unwrap(), vec!["a", "a.b", "a.b.c", "a.d"]);
    }

    #[test]
    fn commit_merges_with_stored_registry() {
        let (_dir, store) = store();
        store.register("r").unwrap();
        store.commit("r", &registry(&[1, 2]), &[]).unwrap();
        store.commit("r", &registry(&[3, 9]), &[]).unwrap();
        assert_eq!(store.load("r").unwrap(), registry(&[1, 2, 3, 9]));

        let missing = store.commit("nope", &registry(&[1]), &[]);
        assert!(matches!(missing, Err(CoreError::ReaderDoesNotExist { .. })));
    }

    #[test]
    fn unregister_drops_subtree_and_hints() {
        let (_dir, store) = store();
        store.register("a.b").unwrap();
        store.register("ab").unwrap();
        store.commit("a.b", &registry(&[4]), &[([7; 32], 4)]).unwrap();
        store.commit("ab", &Registry::new(), &[([7; 32], 9)]).unwrap();

        store.unregister("a").unwrap();
        assert_eq!(store.list().unwrap(), vec!["ab"]);
        assert_eq!(store.hint("a.b", &[7; 32]).unwrap(), None);
        assert_eq!(store.hint("ab", &[7; 32]).unwrap(), Some(9));

        store.register("a.b").unwrap();
        assert!(store.load("a.b").unwrap().is_empty());
        assert!(matches!(store.unregister("zzz"), Err(CoreError::ReaderDoesNotExist { .. })));
    }

    #[test]
    fn reader_names_can_rotate_indefinitely() {
        let (_dir, store) = store();
        store.register("steady").unwrap();
        store.commit("steady", &registry(&[0]), &[]).unwrap();

        for i in 0..100 {
            let name = format!("rotating.r{i}");
            store.register(&name).unwrap();
            store.commit(&name, &registry(&[i, i + 2]), &[([1; 32], i)]).unwrap();
            store.unregister("rotating").unwrap();
            assert_eq!(store.list().unwrap(), vec!["steady"]);
        }

        let txn = store.env.read_txn().unwrap();
        let segments = store.env.open_table(SEGMENTS_TABLE).unwrap().unwrap();
        assert_eq!(segments.len(&txn).unwrap(), 1);
        let hints = store.env.open_table(HINTS_TABLE).unwrap().unwrap();
        assert!(hints.is_empty(&txn).unwrap());
        drop(txn);

        assert_eq!(store.load("steady").unwrap(), registry(&[0]));
    }

    #[test]
    fn clone_copies_committed_registry() {
        let (_dir, store) = store();
        store.register("src").unwrap();
        store.commit("src", &registry(&[1, 5]), &[]).unwrap();

        store.clone_reader("src", "dst.child").unwrap();
        assert_eq!(store.load("dst.child").unwrap(), registry(&[1, 5]));
        assert!(store.is_registered("dst").unwrap());

        assert!(matches!(
            store.clone_reader("src", "dst.child"),
            Err(CoreError::ReaderExists { .. })
        ));
        assert!(matches!(
            store.clone_reader("missing", "other"),
            Err(CoreError::ReaderDoesNotExist { .. })
        ));
    }
}
