//! Equality filters over entry fields.

use crate::error::CoreResult;
use binlog_codec::{encode_value, Fields, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A conjunction of `field ∈ {values}` predicates.
///
/// Predicates on declared indexes are answered from the index postings;
/// the rest are checked against each fetched record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    predicates: BTreeMap<String, Vec<Value>>,
}

impl Filter {
    /// Creates a filter matching every entry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field == value`.
    ///
    /// Calling it twice on the same field accepts either value.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.entry(field.into()).or_default().push(value.into());
        self
    }

    /// Requires `field` to equal one of `values`.
    #[must_use]
    pub fn any_of<V: Into<Value>>(mut self, field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.predicates
            .entry(field.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Returns true if the filter has no predicate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Predicates by field, in field order.
    pub fn predicates(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.predicates.iter().map(|(field, values)| (field.as_str(), values.as_slice()))
    }

    /// Returns true if `fields` satisfies every predicate.
    #[must_use]
    pub fn matches(&self, fields: &Fields) -> bool {
        self.predicates
            .iter()
            .all(|(field, values)| fields.get(field).is_some_and(|v| values.contains(v)))
    }

    /// Stable digest identifying the filter, used to key search hints.
    ///
    /// # Errors
    ///
    /// Returns a codec error if a value cannot be encoded.
    pub fn signature(&self) -> CoreResult<[u8; 32]> {
        let mut hasher = Sha256::new();
        for (field, values) in &self.predicates {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
            hasher.update((values.len() as u64).to_be_bytes());
            for value in values {
                let encoded = encode_value(value)?;
                hasher.update((encoded.len() as u64).to_be_bytes());
                hasher.update(&encoded);
            }
        }
        Ok(hasher.finalize().into())
    }

    /// Predicates on the fields `indexed` returns false for.
    pub(crate) fn residual(&self, mut indexed: impl FnMut(&str) -> bool) -> Filter {
        Filter {
            predicates: self
                .predicates
                .iter()
                .filter(|(field, _)| !indexed(field.as_str()))
                .map(|(field, values)| (field.clone(), values.clone()))
                .collect(),
        }
    }
}
