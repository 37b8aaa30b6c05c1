//! Secondary indexes.
//!
//! Each declared index is a table of the data environment with one row
//! per posting. A row key is the length-prefixed encoded field value
//! followed by the big-endian position of the entry holding it, so the
//! postings of one value are contiguous and sorted by position. Postings
//! are written in the same transaction as the entry and removed with it.

use crate::error::{CoreError, CoreResult};
use crate::iterseek::IterSeek;
use crate::types::{decode_position, position_key, Direction, Position};
use binlog_codec::{decode_record, encode_record, Fields, Value};
use binlog_storage::{Environment, Table};

pub use binlog_codec::KeyKind as IndexKind;

/// Declaration of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Indexed field.
    pub field: String,
    /// Key encoding of the field's values.
    pub kind: IndexKind,
    /// Whether every entry must hold the field.
    pub mandatory: bool,
}

impl IndexSpec {
    /// A mandatory index.
    pub fn mandatory(field: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            field: field.into(),
            kind,
            mandatory: true,
        }
    }

    /// An optional index.
    pub fn optional(field: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            field: field.into(),
            kind,
            mandatory: false,
        }
    }

    /// Name of the table holding this index.
    #[must_use]
    pub fn table_name(&self) -> String {
        format!("entries__idx__{}", self.field)
    }

    /// Index key of a record, `None` if the record doesn't hold the field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidValue`] if a mandatory field is missing,
    /// or a codec error if the value doesn't fit the index kind.
    pub fn key_for(&self, fields: &Fields) -> CoreResult<Option<Vec<u8>>> {
        match fields.get(&self.field) {
            Some(value) if !value.is_null() => Ok(Some(self.kind.encode(value)?)),
            _ if self.mandatory => Err(CoreError::invalid_value(format!(
                "missing mandatory index field {:?}",
                self.field
            ))),
            _ => Ok(None),
        }
    }
}

/// Encodes a set of index declarations as a record keyed by field.
pub(crate) fn encode_specs(specs: &[IndexSpec]) -> CoreResult<Vec<u8>> {
    let fields: Fields = specs
        .iter()
        .map(|spec| {
            let presence = if spec.mandatory { "mandatory" } else { "optional" };
            (spec.field.clone(), Value::Text(format!("{}:{presence}", spec.kind.name())))
        })
        .collect();
    Ok(encode_record(&fields)?)
}

/// Decodes declarations written by [`encode_specs`], sorted by field.
pub(crate) fn decode_specs(raw: &[u8]) -> CoreResult<Vec<IndexSpec>> {
    decode_record(raw)?
        .into_iter()
        .map(|(field, value)| {
            let malformed = || CoreError::corruption(format!("stored index {field:?} is malformed"));
            let Value::Text(text) = value else {
                return Err(malformed());
            };
            let (kind, presence) = text.split_once(':').ok_or_else(malformed)?;
            let mandatory = match presence {
                "mandatory" => true,
                "optional" => false,
                _ => return Err(malformed()),
            };
            Ok(IndexSpec {
                kind: kind.parse()?,
                field,
                mandatory,
            })
        })
        .collect()
}

/// Returns true if `a` and `b` declare the same indexes, in any order.
pub(crate) fn same_specs(a: &[IndexSpec], b: &[IndexSpec]) -> bool {
    a.len() == b.len() && a.iter().all(|spec| b.contains(spec))
}

/// Row key prefix shared by every posting of `value_key`.
fn posting_prefix(value_key: &[u8]) -> Vec<u8> {
    let len = u32::try_from(value_key.len()).unwrap_or(u32::MAX);
    let mut prefix = Vec::with_capacity(4 + value_key.len() + 8);
    prefix.extend_from_slice(&len.to_be_bytes());
    prefix.extend_from_slice(value_key);
    prefix
}

/// Row key of the posting of `position` under `value_key`.
pub(crate) fn posting_key(value_key: &[u8], position: Position) -> Vec<u8> {
    let mut key = posting_prefix(value_key);
    key.extend_from_slice(&position_key(position));
    key
}

/// Positions of the entries whose indexed field equals one value.
///
/// Every step seeks the index table afresh, so postings committed after
/// the cursor was created are visited once the cursor reaches them.
#[derive(Debug)]
pub struct PostingCursor {
    env: Environment,
    table: Option<Table>,
    prefix: Vec<u8>,
    direction: Direction,
    cursor: Option<Position>,
}

impl PostingCursor {
    pub(crate) fn new(
        env: Environment,
        table: Option<Table>,
        spec: &IndexSpec,
        value: &Value,
        direction: Direction,
    ) -> CoreResult<Self> {
        Ok(Self {
            env,
            table,
            prefix: posting_prefix(&spec.kind.encode(value)?),
            direction,
            cursor: Some(direction.start()),
        })
    }

    fn row_position(&self, key: &[u8]) -> CoreResult<Option<Position>> {
        match key.strip_prefix(self.prefix.as_slice()) {
            Some(rest) => decode_position(rest).map(Some),
            None => Ok(None),
        }
    }
}

impl IterSeek for PostingCursor {
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
        let mut target = self.prefix.clone();
        target.extend_from_slice(&position_key(position));
        let row = match self.direction {
            Direction::Forward => table.seek_ge(&txn, &target)?,
            Direction::Backward => table.seek_le(&txn, &target)?,
        };

        let found = match row {
            Some((key, _)) => self.row_position(&key)?,
            None => None,
        };
        self.cursor = found.and_then(|p| self.direction.step(p));
        Ok(found)
    }
}
