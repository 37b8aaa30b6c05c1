//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use binlog_core::{Entry, Position, Slice};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for sets of positions below `bound`.
pub fn position_set_strategy(bound: Position) -> impl Strategy<Value = BTreeSet<Position>> {
    prop::collection::btree_set(0..bound, 0..=(bound as usize / 2).min(32))
}

/// Strategy for valid reader names of one to three dotted levels.
pub fn reader_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}(\\.[a-z][a-z0-9_]{0,7}){0,2}")
        .expect("Invalid regex")
}

/// Strategy for entries holding an `idx` and a `kind` from a small set.
pub fn entry_strategy() -> impl Strategy<Value = Entry> {
    (0i64..1000, prop::sample::select(vec!["click", "view", "buy"]))
        .prop_map(|(idx, kind)| Entry::default().with("idx", idx).with("kind", kind))
}

/// Strategy for a batch of up to `max` entries.
pub fn entries_strategy(max: usize) -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::vec(entry_strategy(), 0..=max)
}

/// Strategy for slices whose bounds reach a little past either end of a
/// log of `len` entries, with a non-zero step.
pub fn slice_strategy(len: i64) -> impl Strategy<Value = Slice> {
    let bound = prop::option::of(-(len + 2)..(len + 2));
    let step = prop_oneof![-3i64..=-1, 1i64..=3];
    (bound.clone(), bound, step).prop_map(|(start, stop, step)| Slice { start, stop, step })
}

/// Strategy for a sequence of acknowledgment targets below `bound`, in
/// arbitrary order and with repeats.
pub fn ack_sequence_strategy(bound: Position) -> impl Strategy<Value = Vec<Position>> {
    prop::collection::vec(0..bound, 0..64)
}
