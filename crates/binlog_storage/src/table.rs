//! Named byte tables.

use crate::error::StorageResult;
use heed::types::Bytes;
use heed::{Database, PutFlags, RoTxn, RwTxn};
use std::fmt;

/// Key/value pair returned by cursor lookups.
pub type Pair = (Vec<u8>, Vec<u8>);

/// Handle to a named table inside an [`Environment`](crate::Environment).
///
/// Handles are plain copies of the LMDB database id; every operation
/// takes the transaction to run in.
#[derive(Clone, Copy)]
pub struct Table {
    db: Database<Bytes, Bytes>,
}

impl Table {
    pub(crate) fn new(db: Database<Bytes, Bytes>) -> Self {
        Self { db }
    }

    /// Gets the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn get(&self, txn: &RoTxn, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.db.get(txn, key)?.map(<[u8]>::to_vec))
    }

    /// Stores `value` under `key`, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn put(&self, txn: &mut RwTxn, key: &[u8], value: &[u8]) -> StorageResult<()> {
        Ok(self.db.put(txn, key, value)?)
    }

    /// Stores `value` under `key` only if the key is absent.
    ///
    /// Returns `false` without writing if the key already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails for any other reason.
    pub fn insert_new(&self, txn: &mut RwTxn, key: &[u8], value: &[u8]) -> StorageResult<bool> {
        match self.db.put_with_flags(txn, PutFlags::NO_OVERWRITE, key, value) {
            Ok(()) => Ok(true),
            Err(heed::Error::Mdb(heed::MdbError::KeyExist)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes `key`, returning false if it was absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn delete(&self, txn: &mut RwTxn, key: &[u8]) -> StorageResult<bool> {
        Ok(self.db.delete(txn, key)?)
    }

    /// Returns the first pair whose key is `>= key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn seek_ge(&self, txn: &RoTxn, key: &[u8]) -> StorageResult<Option<Pair>> {
        Ok(self
            .db
            .get_greater_than_or_equal_to(txn, key)?
            .map(|(k, v)| (k.to_vec(), v.to_vec())))
    }

    /// Returns the last pair whose key is `<= key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn seek_le(&self, txn: &RoTxn, key: &[u8]) -> StorageResult<Option<Pair>> {
        Ok(self
            .db
            .get_lower_than_or_equal_to(txn, key)?
            .map(|(k, v)| (k.to_vec(), v.to_vec())))
    }

    /// Returns the pair with the smallest key.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn first(&self, txn: &RoTxn) -> StorageResult<Option<Pair>> {
        Ok(self.db.first(txn)?.map(|(k, v)| (k.to_vec(), v.to_vec())))
    }

    /// Returns the pair with the largest key.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn last(&self, txn: &RoTxn) -> StorageResult<Option<Pair>> {
        Ok(self.db.last(txn)?.map(|(k, v)| (k.to_vec(), v.to_vec())))
    }

    /// Returns every pair of the table in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn scan(&self, txn: &RoTxn) -> StorageResult<Vec<Pair>> {
        let mut pairs = Vec::new();
        for item in self.db.iter(txn)? {
            let (k, v) = item?;
            pairs.push((k.to_vec(), v.to_vec()));
        }
        Ok(pairs)
    }

    /// Returns every pair whose key starts with `prefix`, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn scan_prefix(&self, txn: &RoTxn, prefix: &[u8]) -> StorageResult<Vec<Pair>> {
        let mut pairs = Vec::new();
        for item in self.db.prefix_iter(txn, prefix)? {
            let (k, v) = item?;
            pairs.push((k.to_vec(), v.to_vec()));
        }
        Ok(pairs)
    }

    /// Deletes every key starting with `prefix`, returning how many went.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn delete_prefix(&self, txn: &mut RwTxn, prefix: &[u8]) -> StorageResult<usize> {
        let keys: Vec<Vec<u8>> = self
            .scan_prefix(txn, prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            self.db.delete(txn, key)?;
        }
        Ok(keys.len())
    }

    /// Returns the `n`-th pair counting back from the last one (`0` is the last).
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn nth_from_end(&self, txn: &RoTxn, n: usize) -> StorageResult<Option<Pair>> {
        match self.db.rev_iter(txn)?.nth(n) {
            Some(item) => {
                let (k, v) = item?;
                Ok(Some((k.to_vec(), v.to_vec())))
            }
            None => Ok(None),
        }
    }

    /// Returns the number of pairs in the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn len(&self, txn: &RoTxn) -> StorageResult<u64> {
        Ok(self.db.len(txn)?)
    }

    /// Returns true if the table holds no pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn is_empty(&self, txn: &RoTxn) -> StorageResult<bool> {
        Ok(self.db.is_empty(txn)?)
    }

    /// Removes every pair from the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn clear(&self, txn: &mut RwTxn) -> StorageResult<()> {
        Ok(self.db.clear(txn)?)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").finish_non_exhaustive()
    }
}
