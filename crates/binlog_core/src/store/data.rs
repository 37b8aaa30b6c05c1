//! The data environment: entries, the position counter and index postings.

use crate::config::LogConfig;
use crate::entry::Entry;
use crate::error::{CoreError, CoreResult};
use crate::index::{decode_specs, encode_specs, posting_key, same_specs, IndexSpec, PostingCursor};
use crate::iterseek::IterSeek;
use crate::types::{decode_position, position_key, Direction, Position, MIN};
use binlog_codec::{decode_record, encode_record, Fields, Value};
use binlog_storage::{EnvOptions, Environment, RwTxn, StorageError, Table};
use std::path::Path;
use tracing::{debug, warn};

/// Table of entries, keyed by big-endian position.
pub const ENTRIES_TABLE: &str = "entries";
/// Table of counters.
pub const META_TABLE: &str = "meta";
const NEXT_POSITION_KEY: &[u8] = b"next_position";
const INDEXES_KEY: &[u8] = b"indexes";

/// Upper bound on declared indexes.
pub const MAX_INDEXES: usize = 64;

#[derive(Debug)]
struct Index {
    spec: IndexSpec,
    table: Option<Table>,
}

/// Entries and their secondary indexes.
#[derive(Debug)]
pub struct DataStore {
    env: Environment,
    entries: Option<Table>,
    meta: Option<Table>,
    indexes: Vec<Index>,
}

impl DataStore {
    /// Opens the data environment in `path`.
    ///
    /// Tables are created on a writable environment; on a read-only one
    /// missing tables read as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment or a table cannot be opened.
    pub fn open(path: &Path, config: &LogConfig) -> CoreResult<Self> {
        if config.indexes.len() > MAX_INDEXES {
            return Err(CoreError::invalid_value("too many indexes"));
        }
        let options = EnvOptions {
            map_size: config.map_size,
            max_tables: MAX_INDEXES as u32 + 2,
            read_only: config.read_only,
            create_if_missing: config.create_if_missing,
        };
        let env = Environment::open(path, &options)?;

        let table = |name: &str| -> CoreResult<Option<Table>> {
            if config.read_only {
                Ok(env.open_table(name)?)
            } else {
                Ok(Some(env.create_table(name)?))
            }
        };

        let entries = table(ENTRIES_TABLE)?;
        let meta = table(META_TABLE)?;
        let specs = resolve_indexes(&env, meta, config)?;
        let indexes = specs
            .into_iter()
            .map(|spec| {
                Ok(Index {
                    table: table(&spec.table_name())?,
                    spec,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            env,
            entries,
            meta,
            indexes,
        })
    }

    /// The underlying environment.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Stores `records` at consecutive positions in one transaction.
    ///
    /// Nothing is written unless every record is stored: a position
    /// collision or a missing mandatory index field aborts the whole batch,
    /// leaving the counter and indexes untouched.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Integrity`] if a single record's position is taken
    /// - [`CoreError::PartialBulkCreate`] if a position of a batch is taken
    /// - [`CoreError::InvalidValue`] if a mandatory index field is missing
    pub fn bulk_create(&self, records: Vec<Fields>) -> CoreResult<Vec<Entry>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let (entries, meta) = self.writable()?;
        let requested = records.len();

        let mut txn = self.env.write_txn()?;
        let first = match meta.get(&txn, NEXT_POSITION_KEY)? {
            Some(raw) => decode_position(&raw)?,
            None => MIN,
        };

        let mut saved = Vec::with_capacity(requested);
        for (offset, fields) in records.into_iter().enumerate() {
            let position = (offset as u64)
                .checked_add(first)
                .ok_or_else(|| CoreError::invalid_value("position space exhausted"))?;
            let record = encode_record(&fields)?;

            if !entries.insert_new(&mut txn, &position_key(position), &record)? {
                // Dropping the transaction rolls back what this batch stored.
                return Err(if requested == 1 {
                    CoreError::Integrity { position }
                } else {
                    CoreError::PartialBulkCreate {
                        stored: offset,
                        requested,
                    }
                });
            }
            self.add_postings(&mut txn, position, &fields)?;
            saved.push(Entry::saved(position, fields));
        }

        let next = (requested as u64)
            .checked_add(first)
            .ok_or_else(|| CoreError::invalid_value("position space exhausted"))?;
        meta.put(&mut txn, NEXT_POSITION_KEY, &position_key(next))?;
        txn.commit().map_err(binlog_storage::StorageError::from)?;

        debug!(first, count = requested, "entries created");
        Ok(saved)
    }

    /// Stores one record.
    ///
    /// # Errors
    ///
    /// See [`DataStore::bulk_create`].
    pub fn create(&self, fields: Fields) -> CoreResult<Entry> {
        self.bulk_create(vec![fields])?
            .pop()
            .ok_or_else(|| CoreError::corruption("create stored no entry"))
    }

    /// Stores an opaque blob as the `data` field of a new entry.
    ///
    /// # Errors
    ///
    /// See [`DataStore::bulk_create`].
    pub fn append(&self, raw: &[u8]) -> CoreResult<Position> {
        let mut fields = Fields::new();
        fields.insert("data".to_string(), Value::Bytes(raw.to_vec()));
        self.create(fields)?
            .position()
            .ok_or_else(|| CoreError::corruption("stored entry has no position"))
    }

    /// Reads the entry at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the record cannot be decoded.
    pub fn get(&self, position: Position) -> CoreResult<Option<Entry>> {
        let Some(entries) = self.entries else {
            return Ok(None);
        };
        let txn = self.env.read_txn()?;
        match entries.get(&txn, &position_key(position))? {
            Some(raw) => Ok(Some(Entry::saved(position, decode_record(&raw)?))),
            None => Ok(None),
        }
    }

    /// Number of live entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn len(&self) -> CoreResult<u64> {
        let Some(entries) = self.entries else {
            return Ok(0);
        };
        let txn = self.env.read_txn()?;
        Ok(entries.len(&txn)?)
    }

    /// Position of the `n`-th live entry counting back from the last one.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn nth_from_end(&self, n: usize) -> CoreResult<Option<Position>> {
        let Some(entries) = self.entries else {
            return Ok(None);
        };
        let txn = self.env.read_txn()?;
        entries
            .nth_from_end(&txn, n)?
            .map(|(key, _)| decode_position(&key))
            .transpose()
    }

    /// Position of the first live entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn first_position(&self) -> CoreResult<Option<Position>> {
        let Some(entries) = self.entries else {
            return Ok(None);
        };
        let txn = self.env.read_txn()?;
        entries
            .first(&txn)?
            .map(|(key, _)| decode_position(&key))
            .transpose()
    }

    /// Position of the last live entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn last_position(&self) -> CoreResult<Option<Position>> {
        self.nth_from_end(0)
    }

    /// Deletes the entry at `position` and its index postings.
    ///
    /// Returns false if there is no such entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn remove(&self, position: Position) -> CoreResult<bool> {
        let (removed, _) = self.remove_many(&[position])?;
        Ok(removed == 1)
    }

    /// Deletes several entries in one transaction.
    ///
    /// Returns `(removed, not_found)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn remove_many(&self, positions: &[Position]) -> CoreResult<(u64, u64)> {
        let (entries, _) = self.writable()?;
        let mut txn = self.env.write_txn()?;
        let (mut removed, mut not_found) = (0, 0);

        for &position in positions {
            let key = position_key(position);
            let Some(raw) = entries.get(&txn, &key)? else {
                not_found += 1;
                continue;
            };
            let fields = decode_record(&raw)?;
            for index in &self.indexes {
                if let (Some(table), Ok(Some(value_key))) = (index.table, index.spec.key_for(&fields)) {
                    table.delete(&mut txn, &posting_key(&value_key, position))?;
                }
            }
            entries.delete(&mut txn, &key)?;
            removed += 1;
        }

        txn.commit().map_err(binlog_storage::StorageError::from)?;
        Ok((removed, not_found))
    }

    /// Walks the positions of live entries.
    pub fn cursor(&self, direction: Direction) -> EntryCursor {
        EntryCursor {
            env: self.env.clone(),
            table: self.entries,
            direction,
            cursor: Some(direction.start()),
        }
    }

    /// Indexes in effect, in declaration order.
    pub fn indexes(&self) -> impl Iterator<Item = &IndexSpec> {
        self.indexes.iter().map(|i| &i.spec)
    }

    /// Declared index on `field`.
    pub fn index_spec(&self, field: &str) -> Option<&IndexSpec> {
        self.indexes.iter().map(|i| &i.spec).find(|s| s.field == field)
    }

    /// Walks the positions of entries whose indexed `field` equals `value`.
    ///
    /// Returns `None` if `field` is not indexed.
    ///
    /// # Errors
    ///
    /// Returns a codec error if `value` doesn't fit the index kind.
    pub fn postings(
        &self,
        field: &str,
        value: &Value,
        direction: Direction,
    ) -> CoreResult<Option<PostingCursor>> {
        let Some(index) = self.indexes.iter().find(|i| i.spec.field == field) else {
            return Ok(None);
        };
        PostingCursor::new(self.env.clone(), index.table, &index.spec, value, direction).map(Some)
    }

    fn add_postings(&self, txn: &mut RwTxn, position: Position, fields: &Fields) -> CoreResult<()> {
        for index in &self.indexes {
            if let Some(value_key) = index.spec.key_for(fields)? {
                let table = index.table.ok_or(StorageError::ReadOnly)?;
                table.put(txn, &posting_key(&value_key, position), &[])?;
            }
        }
        Ok(())
    }

    fn writable(&self) -> CoreResult<(Table, Table)> {
        match (self.entries, self.meta) {
            (Some(entries), Some(meta)) if !self.env.is_read_only() => Ok((entries, meta)),
            _ => Err(StorageError::ReadOnly.into()),
        }
    }
}

/// Picks the indexes to open with, recording them on first writable open.
fn resolve_indexes(env: &Environment, meta: Option<Table>, config: &LogConfig) -> CoreResult<Vec<IndexSpec>> {
    let stored = match meta {
        Some(meta) => {
            let txn = env.read_txn()?;
            meta.get(&txn, INDEXES_KEY)?
                .map(|raw| decode_specs(&raw))
                .transpose()?
        }
        None => None,
    };

    match (stored, meta) {
        (Some(stored), _) if config.adopt_indexes => Ok(stored),
        (Some(stored), _) if !same_specs(&stored, &config.indexes) => {
            warn!(
                stored = stored.len(),
                declared = config.indexes.len(),
                "declared indexes differ from the recorded ones"
            );
            Err(CoreError::ConfigMismatch)
        }
        (Some(_), _) | (None, None) => Ok(config.indexes.clone()),
        (None, Some(_)) if env.is_read_only() => Ok(config.indexes.clone()),
        (None, Some(meta)) => {
            let mut txn = env.write_txn()?;
            meta.put(&mut txn, INDEXES_KEY, &encode_specs(&config.indexes)?)?;
            txn.commit().map_err(binlog_storage::StorageError::from)?;
            debug!(count = config.indexes.len(), "indexes recorded");
            Ok(config.indexes.clone())
        }
    }
}

/// Walks the positions of the entries table.
#[derive(Debug, Clone)]
pub struct EntryCursor {
    env: Environment,
    table: Option<Table>,
    direction: Direction,
    cursor: Option<Position>,
}

impl IterSeek for EntryCursor {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn seek(&mut self, position: Position) -> CoreResult<()> {
        self.cursor = Some(position);
        Ok(())
    }

    fn next_position(&mut self) -> CoreResult<Option<Position>> {
        let (Some(position), Some(table)) = (self.cursor, self.table) else {
            return Ok(None);
        };
        let txn = self.env.read_txn()?;
        let key = position_key(position);
        let row = match self.direction {
            Direction::Forward => table.seek_ge(&txn, &key)?,
            Direction::Backward => table.seek_le(&txn, &key)?,
        };

        match row {
            Some((key, _)) => {
                let found = decode_position(&key)?;
                self.cursor = self.direction.step(found);
                Ok(Some(found))
            }
            None => {
                self.cursor = None;
                Ok(None)
            }
        }
    }
}
