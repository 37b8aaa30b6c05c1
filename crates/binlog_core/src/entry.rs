//! Log entries.

use crate::error::{CoreError, CoreResult};
use crate::types::Position;
use binlog_codec::{Fields, Value};

/// A record of the log.
///
/// Entries built by the caller are *unsaved* until they are stored by
/// [`crate::Connection::create`] or [`crate::Connection::bulk_create`],
/// which return them with their assigned position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    position: Option<Position>,
    fields: Fields,
}

impl Entry {
    /// Creates an unsaved entry.
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self {
            position: None,
            fields,
        }
    }

    pub(crate) fn saved(position: Position, fields: Fields) -> Self {
        Self {
            position: Some(position),
            fields,
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Position of a saved entry.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Returns true once the entry has been stored.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.position.is_some()
    }

    /// The entry's fields.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Value of one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Consumes the entry, returning its fields.
    #[must_use]
    pub fn into_fields(self) -> Fields {
        self.fields
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Entry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Something that can be acknowledged: a position or a saved entry.
pub trait AckTarget {
    /// Position to acknowledge.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidValue`] for unsaved entries.
    fn ack_position(&self) -> CoreResult<Position>;
}

impl AckTarget for Position {
    fn ack_position(&self) -> CoreResult<Position> {
        Ok(*self)
    }
}

impl AckTarget for Entry {
    fn ack_position(&self) -> CoreResult<Position> {
        self.position
            .ok_or_else(|| CoreError::invalid_value("entry has not been saved"))
    }
}

impl<T: AckTarget + ?Sized> AckTarget for &T {
    fn ack_position(&self) -> CoreResult<Position> {
        (**self).ack_position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_accessors() {
        let entry = Entry::default().with("kind", "click").with("n", 3i64);
        assert!(!entry.is_saved());
        assert_eq!(entry.get("kind"), Some(&Value::from("click")));
        assert_eq!(entry.get("n"), Some(&Value::Integer(3)));
        assert_eq!(entry.fields().len(), 2);
    }

    #[test]
    fn collects_from_pairs() {
        let entry: Entry = [("a", 1i64), ("b", 2i64)].into_iter().collect();
        assert_eq!(entry.into_fields().len(), 2);
    }

    #[test]
    fn unsaved_entries_cannot_be_acknowledged() {
        let entry = Entry::default();
        assert!(matches!(entry.ack_position(), Err(CoreError::InvalidValue { .. })));

        let saved = Entry::saved(7, Fields::new());
        assert_eq!(saved.ack_position().unwrap(), 7);
        assert_eq!((&saved).ack_position().unwrap(), 7);
        assert_eq!(7u64.ack_position().unwrap(), 7);
    }
}
