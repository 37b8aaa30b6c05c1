//! Cross-crate integration test helpers.
//!
//! [`AckHarness`] drives a real log and a plain in-memory model side by
//! side, asserting after every step that readers see exactly what the
//! model predicts.

use crate::fixtures::TestLog;
use binlog_core::{CoreResult, Entry, Position, PurgeStats, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A log paired with a model of its live entries and committed acks.
pub struct AckHarness {
    log: TestLog,
    live: BTreeSet<Position>,
    acked: BTreeMap<String, BTreeSet<Position>>,
}

impl AckHarness {
    /// Creates a harness over a log of `count` entries.
    pub fn new(count: i64) -> Self {
        let log = TestLog::new();
        log.fill(count);
        let live = (0..count.max(0).unsigned_abs()).collect();
        Self {
            log,
            live,
            acked: BTreeMap::new(),
        }
    }

    /// The underlying log.
    pub fn log(&self) -> &TestLog {
        &self.log
    }

    /// Registers `name` and its missing ancestors.
    pub fn register(&mut self, name: &str) {
        self.log
            .register_reader(name)
            .expect("Failed to register reader");
        for level in levels(name) {
            self.acked.entry(level).or_default();
        }
    }

    /// Acknowledges `positions` as `name` and commits.
    pub fn ack(&mut self, name: &str, positions: &[Position], recursive: bool) {
        let reader = self.log.reader(Some(name)).expect("Failed to open reader");
        for &position in positions {
            if recursive {
                reader.recursive_ack(position).expect("Failed to ack");
            } else {
                reader.ack(position).expect("Failed to ack");
            }
        }
        reader.close().expect("Failed to commit reader");

        let targets = if recursive {
            levels(name)
        } else {
            vec![name.to_string()]
        };
        for level in targets {
            self.acked
                .entry(level)
                .or_default()
                .extend(positions.iter().copied());
        }
    }

    /// Positions the model expects `name` to yield, in order.
    pub fn expected(&self, name: &str) -> Vec<Position> {
        let acked = self.acked.get(name).cloned().unwrap_or_default();
        self.live.difference(&acked).copied().collect()
    }

    /// Asserts that `name` yields exactly the model's positions, both ways.
    pub fn verify(&self, name: &str) {
        let reader = self.log.reader(Some(name)).expect("Failed to open reader");
        let forward = positions(reader.iter().expect("Failed to iterate"));
        let mut backward = positions(reader.iter_rev().expect("Failed to iterate"));
        backward.reverse();

        let expected = self.expected(name);
        assert_eq!(forward, expected, "forward walk of reader {name}");
        assert_eq!(backward, expected, "backward walk of reader {name}");
        assert_eq!(
            reader.pending().expect("Failed to count"),
            expected.len() as u64,
            "pending count of reader {name}"
        );
    }

    /// Verifies every registered reader.
    pub fn verify_all(&self) {
        for name in self.acked.keys() {
            self.verify(name);
        }
    }

    /// Purges the log and checks the outcome against the model.
    pub fn purge(&mut self) -> PurgeStats {
        let mut common: Option<BTreeSet<Position>> = None;
        for acked in self.acked.values() {
            common = Some(match common {
                None => acked.clone(),
                Some(c) => c.intersection(acked).copied().collect(),
            });
        }
        let expected: BTreeSet<Position> = common
            .unwrap_or_default()
            .intersection(&self.live)
            .copied()
            .collect();

        let stats = self.log.purge().expect("Failed to purge");
        assert_eq!(stats.removed, expected.len() as u64, "purged entry count");
        for position in &expected {
            assert!(
                self.log.get(*position).expect("Failed to read").is_none(),
                "entry {position} survived the purge"
            );
            self.live.remove(position);
        }
        stats
    }
}

/// `name` and its ancestors, outermost first.
fn levels(name: &str) -> Vec<String> {
    name.match_indices('.')
        .map(|(i, _)| name[..i].to_string())
        .chain(std::iter::once(name.to_string()))
        .collect()
}

/// Positions of a stream of entries, panicking on errors.
pub fn positions(entries: impl Iterator<Item = CoreResult<Entry>>) -> Vec<Position> {
    entries
        .map(|entry| {
            entry
                .expect("Failed to read entry")
                .position()
                .expect("Entry without position")
        })
        .collect()
}

/// The `idx` field of a stream of entries, panicking on errors.
pub fn indexes(entries: impl Iterator<Item = CoreResult<Entry>>) -> Vec<i64> {
    entries
        .map(|entry| {
            entry
                .expect("Failed to read entry")
                .get("idx")
                .and_then(Value::as_integer)
                .expect("Entry without idx")
        })
        .collect()
}

/// Indexes selected by slicing a sequence of `len` items.
pub fn sequence_slice(len: i64, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<i64> {
    let clamp = |bound: i64, lo: i64, hi: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(lo, hi)
    };
    let mut out = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |b| clamp(b, 0, len));
        let end = stop.map_or(len, |b| clamp(b, 0, len));
        while i < end {
            out.push(i);
            i += step;
        }
    } else {
        let mut i = start.map_or(len - 1, |b| clamp(b, -1, len - 1));
        let end = stop.map_or(-1, |b| clamp(b, -1, len - 1));
        while i > end {
            out.push(i);
            i += step;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::scenarios;
    use crate::generators::{ack_sequence_strategy, slice_strategy};
    use binlog_core::{ConnectionRegistry, CoreError, Filter, Slice};
    use proptest::prelude::*;

    #[test]
    fn acknowledgments_survive_reopening() {
        let mut log = scenarios::log_with_readers(100, &["r"]);
        let reader = log.reader(Some("r")).unwrap();
        for p in [3u64, 4, 5] {
            reader.ack(p).unwrap();
        }
        reader.close().unwrap();

        let expected: Vec<i64> = (0..100).filter(|i| !(3..=5).contains(i)).collect();
        assert_eq!(indexes(log.reader(Some("r")).unwrap().iter().unwrap()), expected);

        log.reopen();
        assert_eq!(indexes(log.reader(Some("r")).unwrap().iter().unwrap()), expected);
    }

    #[test]
    fn recursive_ack_marks_the_whole_lineage() {
        let log = scenarios::log_with_readers(10, &["p.c", "s"]);
        let child = log.reader(Some("p.c")).unwrap();
        assert!(child.recursive_ack(7u64).unwrap());
        child.close().unwrap();

        for name in ["p", "p.c"] {
            let reader = log.reader(Some(name)).unwrap();
            assert!(reader.is_acked(7u64).unwrap(), "{name}");
            assert!(!positions(reader.iter().unwrap()).contains(&7));
        }
        assert!(!log.reader(Some("s")).unwrap().is_acked(7u64).unwrap());
    }

    #[test]
    fn purge_removes_only_what_every_reader_acked() {
        let log = scenarios::log_with_readers(5, &["a", "b"]);
        for name in ["a", "b"] {
            let reader = log.reader(Some(name)).unwrap();
            reader.ack(0u64).unwrap();
            reader.close().unwrap();
        }
        let stats = log.purge().unwrap();
        assert_eq!((stats.removed, stats.not_found), (1, 0));
        assert!(log.get(0).unwrap().is_none());
        assert_eq!(log.len().unwrap(), 4);

        let log = scenarios::log_with_readers(5, &["a", "b", "lagging"]);
        for name in ["a", "b"] {
            let reader = log.reader(Some(name)).unwrap();
            reader.ack(0u64).unwrap();
            reader.close().unwrap();
        }
        assert_eq!(log.purge().unwrap().removed, 0);
        assert_eq!(log.len().unwrap(), 5);
    }

    #[test]
    fn negative_indexes_and_reversed_slices() {
        let log = scenarios::log_with_readers(10, &["r"]);
        let reader = log.reader(Some("r")).unwrap();

        assert_eq!(reader.get(-1).unwrap(), reader.get(9).unwrap());
        assert_eq!(
            positions(reader.slice(Slice::new().step(-1)).unwrap()),
            positions(reader.iter_rev().unwrap())
        );
        assert!(matches!(
            reader.slice(Slice::new().step(0)),
            Err(CoreError::InvalidValue { .. })
        ));
    }

    #[test]
    fn read_only_logs_serve_reads_and_refuse_writes() {
        let mut log = scenarios::log_with_readers(5, &["r"]);
        let reader = log.reader(Some("r")).unwrap();
        reader.ack(0u64).unwrap();
        reader.close().unwrap();

        log.reopen_read_only();
        let reader = log.reader(Some("r")).unwrap();
        assert_eq!(positions(reader.iter().unwrap()), vec![1, 2, 3, 4]);
        assert_eq!(reader.pending().unwrap(), 4);
        assert_eq!(reader.get(-1).unwrap().position(), Some(4));

        assert!(reader.ack(1u64).unwrap());
        assert!(reader.commit().unwrap_err().is_read_only());
        assert!(log.append(b"x").unwrap_err().is_read_only());
        assert!(log.register_reader("other").unwrap_err().is_read_only());
    }

    #[test]
    fn filtered_acknowledgment_resumes_across_sessions() {
        let mut log = scenarios::log_with_readers(10, &["r"]);
        let evens = Filter::new().eq("kind", "even");

        let reader = log.reader(Some("r")).unwrap();
        assert_eq!(reader.ack_from_filter(&evens, false, Some(2)).unwrap(), 2);
        assert_eq!(reader.ack_from_filter(&evens, false, None).unwrap(), 3);
        reader.close().unwrap();

        log.reopen();
        let reader = log.reader(Some("r")).unwrap();
        assert_eq!(indexes(reader.iter().unwrap()), vec![1, 3, 5, 7, 9]);
        assert_eq!(reader.ack_from_filter(&evens, false, None).unwrap(), 0);
    }

    #[test]
    fn connections_are_shared_and_misuse_is_caught() {
        let log = TestLog::new();
        let mut other = log.registry().open(log.path(), log.config().unwrap().clone()).unwrap();
        assert!(other.shares_handle_with(&log));
        assert_eq!(log.registry().ref_count(log.path()), 2);

        other.append(b"shared").unwrap();
        assert_eq!(log.len().unwrap(), 1);

        other.close().unwrap();
        assert!(matches!(other.close(), Err(CoreError::BadUsage { .. })));
        assert!(matches!(other.len(), Err(CoreError::BadUsage { .. })));
        assert_eq!(log.len().unwrap(), 1);

        let registry: ConnectionRegistry = log.registry().clone();
        let path = log.path().to_path_buf();
        let config = log.config().unwrap().clone();
        std::thread::spawn(move || {
            let conn = registry.open(&path, config).unwrap();
            conn.append(b"from another thread").unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(log.len().unwrap(), 2);
        assert_eq!(log.registry().ref_count(log.path()), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn readers_and_purge_agree_with_the_model(
            first in ack_sequence_strategy(20),
            second in ack_sequence_strategy(20),
            child in ack_sequence_strategy(20),
        ) {
            let mut harness = AckHarness::new(20);
            harness.register("a");
            harness.register("b.c");

            harness.ack("a", &first, false);
            harness.ack("b", &second, false);
            harness.ack("b.c", &child, true);
            harness.verify_all();

            harness.purge();
            harness.verify_all();
        }

        #[test]
        fn slices_of_a_contiguous_log_match_sequence_slices(
            len in 0i64..12,
            slice in slice_strategy(12),
        ) {
            let log = scenarios::populated_log(len);
            let reader = log.reader(None).unwrap();
            let got = indexes(reader.slice(slice).unwrap());
            prop_assert_eq!(got, sequence_slice(len, slice.start, slice.stop, slice.step));
        }
    }
}
