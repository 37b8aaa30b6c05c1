//! # Readers
//!
//! A [`Reader`] walks the log on behalf of a named consumer and records
//! which positions it has acknowledged. Acknowledgments accumulate in an
//! in-memory delta and become visible to other readers of the same name
//! on [`Reader::commit`].
//!
//! Reader names are dotted paths. `"a.b"` is a child of `"a"`: a
//! [`Reader::recursive_ack`] on the child also acknowledges in every
//! ancestor, while a plain [`Reader::ack`] stays local.
//!
//! ## Design Principles
//!
//! - Iteration yields the live entries the reader has not acknowledged,
//!   including acknowledgments made earlier in the same session
//! - Acknowledging while iterating is allowed; both take `&self`
//! - Read-only store errors end a walk instead of surfacing
//! - Dropping an unclosed reader commits on a best-effort basis

mod filter;
mod slice;

pub use filter::Filter;
pub use slice::{Slice, SliceEntries};

use crate::connection::Connection;
use crate::db_registry::CachedRegistry;
use crate::entry::{AckTarget, Entry};
use crate::error::{CoreError, CoreResult};
use crate::iterseek::{And, BoxedSeek, IterSeek, Or, SegmentWalk, SharedRegistry};
use crate::registry::Registry;
use crate::store::lineage;
use crate::types::{Direction, Position};
use slice::{Bound, Plan};
use std::cell::{Cell, RefCell};
use std::fmt;
use tracing::{debug, warn};

/// One reader in the dotted-name chain and its pending acknowledgments.
#[derive(Debug)]
struct Level {
    name: String,
    delta: SharedRegistry,
}

/// A consumer cursor over a log.
pub struct Reader<'c> {
    conn: &'c Connection,
    // Ancestors first; the reader's own level is last. Empty when anonymous.
    levels: Vec<Level>,
    hints: RefCell<Vec<([u8; 32], Position)>>,
    dirty: Cell<bool>,
    closed: bool,
}

impl<'c> Reader<'c> {
    pub(crate) fn open(conn: &'c Connection, name: Option<&str>) -> CoreResult<Self> {
        let stores = conn.stores()?;
        let levels = match name {
            None => Vec::new(),
            Some(name) => {
                if !stores.readers.is_registered(name)? {
                    return Err(CoreError::reader_does_not_exist(name));
                }
                lineage(name)
                    .map(|level| Level {
                        name: level.to_string(),
                        delta: SharedRegistry::default(),
                    })
                    .collect()
            }
        };
        debug!(reader = name.unwrap_or("<anonymous>"), "reader opened");
        Ok(Self {
            conn,
            levels,
            hints: RefCell::new(Vec::new()),
            dirty: Cell::new(false),
            closed: false,
        })
    }

    /// Name of the reader, `None` when anonymous.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.levels.last().map(|level| level.name.as_str())
    }

    /// Returns true for anonymous readers.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.levels.is_empty()
    }

    fn own(&self) -> CoreResult<&Level> {
        self.levels.last().ok_or(CoreError::AnonymousReader)
    }

    fn cached(&self, level: &Level) -> CoreResult<CachedRegistry> {
        let segments = self.conn.stores()?.readers.segments(&level.name)?;
        Ok(CachedRegistry::new(segments, level.delta.clone()))
    }

    fn ack_level(&self, level: &Level, position: Position) -> CoreResult<bool> {
        if self.cached(level)?.contains(position)? {
            return Ok(false);
        }
        let changed = level.delta.add(position)?;
        if changed {
            self.dirty.set(true);
        }
        Ok(changed)
    }

    // ========================================================================
    // Acknowledgment
    // ========================================================================

    /// Acknowledges `target` for this reader.
    ///
    /// Returns false if it was already acknowledged.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AnonymousReader`] for anonymous readers
    /// - [`CoreError::InvalidValue`] for unsaved entries
    pub fn ack(&self, target: impl AckTarget) -> CoreResult<bool> {
        self.conn.check()?;
        let level = self.own()?;
        self.ack_level(level, target.ack_position()?)
    }

    /// Acknowledges `target` for this reader and every ancestor.
    ///
    /// Returns true if any of them changed.
    ///
    /// # Errors
    ///
    /// See [`Reader::ack`].
    pub fn recursive_ack(&self, target: impl AckTarget) -> CoreResult<bool> {
        self.conn.check()?;
        self.own()?;
        let position = target.ack_position()?;
        let mut changed = false;
        for level in self.levels.iter().rev() {
            changed |= self.ack_level(level, position)?;
        }
        Ok(changed)
    }

    /// Returns true if this reader has acknowledged `target`, committed or not.
    ///
    /// Anonymous readers acknowledge nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidValue`] for unsaved entries.
    pub fn is_acked(&self, target: impl AckTarget) -> CoreResult<bool> {
        self.conn.check()?;
        let position = target.ack_position()?;
        match self.levels.last() {
            Some(level) => self.cached(level)?.contains(position),
            None => Ok(false),
        }
    }

    /// Persists pending acknowledgments and search hints, for this reader
    /// and then for each ancestor.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ReaderDoesNotExist`] if a level was
    /// unregistered meanwhile, or a storage error if the write fails.
    pub fn commit(&self) -> CoreResult<()> {
        self.conn.check()?;
        if !self.dirty.get() {
            return Ok(());
        }
        let readers = &self.conn.stores()?.readers;
        let hints = self.hints.borrow().clone();

        for (depth, level) in self.levels.iter().enumerate().rev() {
            let own = depth + 1 == self.levels.len();
            let level_hints: &[([u8; 32], Position)] = if own { &hints } else { &[] };
            {
                let delta = level.delta.borrow();
                if delta.is_empty() && level_hints.is_empty() {
                    continue;
                }
                readers.commit(&level.name, &delta, level_hints)?;
            }
            // Committed acks are on disk now; a level that failed keeps its own.
            level.delta.take();
        }

        self.hints.borrow_mut().clear();
        self.dirty.set(false);
        debug!(reader = self.name(), "reader committed");
        Ok(())
    }

    /// Commits and closes the reader.
    ///
    /// # Errors
    ///
    /// See [`Reader::commit`]. The reader is closed either way.
    pub fn close(mut self) -> CoreResult<()> {
        let result = self.commit();
        self.closed = true;
        result
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    fn unacked(&self, direction: Direction) -> CoreResult<BoxedSeek<'static>> {
        let entries = self.conn.stores()?.data.cursor(direction);
        match self.levels.last() {
            None => Ok(Box::new(entries)),
            Some(level) => Ok(Box::new(And::pair(
                entries,
                self.cached(level)?.unacked(direction)?,
            )?)),
        }
    }

    fn entries(&self, direction: Direction) -> CoreResult<Entries<'c>> {
        self.conn.check()?;
        Ok(Entries::new(self.conn, self.unacked(direction)?, None))
    }

    /// Unacknowledged entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadUsage`] if the connection is not usable.
    pub fn iter(&self) -> CoreResult<Entries<'c>> {
        self.entries(Direction::Forward)
    }

    /// Unacknowledged entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadUsage`] if the connection is not usable.
    pub fn iter_rev(&self) -> CoreResult<Entries<'c>> {
        self.entries(Direction::Backward)
    }

    fn filtered(&self, filter: &Filter, direction: Direction) -> CoreResult<Entries<'c>> {
        self.conn.check()?;
        let data = &self.conn.stores()?.data;
        let mut streams: Vec<BoxedSeek<'static>> = vec![self.unacked(direction)?];

        for (field, values) in filter.predicates() {
            if data.index_spec(field).is_none() {
                continue;
            }
            let mut postings: Vec<BoxedSeek<'static>> = Vec::with_capacity(values.len());
            for value in values {
                match data.postings(field, value, direction) {
                    Ok(Some(cursor)) => postings.push(Box::new(cursor)),
                    // A value the index can't encode is held by no entry.
                    Ok(None) | Err(CoreError::Codec(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            streams.push(if postings.is_empty() {
                Box::new(SegmentWalk::new(Registry::new(), direction))
            } else {
                Box::new(Or::new(postings)?)
            });
        }

        let residual = filter.residual(|field| data.index_spec(field).is_some());
        let stream: BoxedSeek<'static> = if streams.len() == 1 {
            streams.remove(0)
        } else {
            Box::new(And::new(streams)?)
        };
        Ok(Entries::new(
            self.conn,
            stream,
            (!residual.is_empty()).then_some(residual),
        ))
    }

    /// Unacknowledged entries matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadUsage`] if the connection is not usable.
    pub fn filter(&self, filter: &Filter) -> CoreResult<Entries<'c>> {
        self.filtered(filter, Direction::Forward)
    }

    /// Unacknowledged entries matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BadUsage`] if the connection is not usable.
    pub fn filter_rev(&self, filter: &Filter) -> CoreResult<Entries<'c>> {
        self.filtered(filter, Direction::Backward)
    }

    /// Number of unacknowledged live entries.
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails.
    pub fn pending(&self) -> CoreResult<u64> {
        self.conn.check()?;
        let mut stream = self.unacked(Direction::Forward)?;
        let mut count = 0;
        loop {
            match stream.next_position() {
                Ok(Some(_)) => count += 1,
                Ok(None) => return Ok(count),
                Err(err) if err.is_read_only() => return Ok(count),
                Err(err) => return Err(err),
            }
        }
    }

    // ========================================================================
    // Filtered acknowledgment
    // ========================================================================

    fn hint(&self, name: &str, signature: &[u8; 32]) -> CoreResult<Option<Position>> {
        let pending = self
            .hints
            .borrow()
            .iter()
            .find(|(s, _)| s == signature)
            .map(|&(_, position)| position);
        match pending {
            Some(position) => Ok(Some(position)),
            None => self.conn.stores()?.readers.hint(name, signature),
        }
    }

    fn set_hint(&self, signature: [u8; 32], position: Position) {
        let mut hints = self.hints.borrow_mut();
        match hints.iter_mut().find(|(s, _)| *s == signature) {
            Some(hint) => hint.1 = position,
            None => hints.push((signature, position)),
        }
        self.dirty.set(true);
    }

    /// Acknowledges the unacknowledged entries matching `filter`, up to
    /// `limit` of them, and returns how many were acknowledged.
    ///
    /// The scan resumes where the previous scan with an identical filter
    /// stopped; the resume point is persisted by the next commit.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AnonymousReader`] for anonymous readers.
    pub fn ack_from_filter(
        &self,
        filter: &Filter,
        recursive: bool,
        limit: Option<usize>,
    ) -> CoreResult<usize> {
        self.conn.check()?;
        let own = self.own()?;
        let signature = filter.signature()?;

        let mut entries = self.filtered(filter, Direction::Forward)?;
        if let Some(position) = self.hint(&own.name, &signature)? {
            entries.seek(position)?;
        }

        let mut acked = 0;
        let mut last_visited = None;
        let mut exhausted = false;
        while limit.map_or(true, |limit| acked < limit) {
            let Some(entry) = entries.next() else {
                exhausted = true;
                break;
            };
            let entry = entry?;
            let changed = if recursive {
                self.recursive_ack(&entry)?
            } else {
                self.ack(&entry)?
            };
            if changed {
                acked += 1;
            }
            last_visited = entry.position();
        }

        let resume = if exhausted {
            self.conn.last_position()?.or(last_visited)
        } else {
            last_visited
        };
        if let Some(position) = resume {
            self.set_hint(signature, position);
        }
        debug!(reader = own.name.as_str(), acked, ?resume, "filtered acknowledgment");
        Ok(acked)
    }

    // ========================================================================
    // Addressing
    // ========================================================================

    /// The entry at `index`, regardless of acknowledgments.
    ///
    /// Non-negative indexes are positions; negative ones count back from
    /// the last live entry, `-1` being the last.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if there is no such entry.
    pub fn get(&self, index: i64) -> CoreResult<Entry> {
        self.conn.check()?;
        match self.lookup(index) {
            Ok(Some(entry)) => Ok(entry),
            Ok(None) => Err(CoreError::IndexOutOfRange { index }),
            Err(err) if err.is_read_only() => Err(CoreError::IndexOutOfRange { index }),
            Err(err) => Err(err),
        }
    }

    fn lookup(&self, index: i64) -> CoreResult<Option<Entry>> {
        let data = &self.conn.stores()?.data;
        match Bound::resolve(Some(index), |n| data.nth_from_end(n))? {
            Bound::At(position) => data.get(position),
            Bound::Open | Bound::BeforeFirst => Ok(None),
        }
    }

    /// Unacknowledged entries within `slice`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidValue`] if the step is zero.
    pub fn slice(&self, slice: Slice) -> CoreResult<SliceEntries<'c>> {
        let direction = slice.direction()?;
        let entries = self.entries(direction)?;
        let data = &self.conn.stores()?.data;
        let start = Bound::resolve(slice.start, |n| data.nth_from_end(n))?;
        let stop = Bound::resolve(slice.stop, |n| data.nth_from_end(n))?;
        SliceEntries::new(entries, &slice, Plan::new(direction, start, stop))
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("name", &self.name())
            .field("dirty", &self.dirty.get())
            .finish_non_exhaustive()
    }
}

impl Drop for Reader<'_> {
    fn drop(&mut self) {
        if self.closed || !self.dirty.get() {
            return;
        }
        if let Err(err) = self.commit() {
            warn!(reader = self.name(), error = %err, "commit on drop failed");
        }
    }
}

/// Entries produced by a position stream, fetched one at a time.
pub struct Entries<'c> {
    conn: &'c Connection,
    stream: BoxedSeek<'static>,
    residual: Option<Filter>,
    done: bool,
}

impl<'c> Entries<'c> {
    fn new(conn: &'c Connection, stream: BoxedSeek<'static>, residual: Option<Filter>) -> Self {
        Self {
            conn,
            stream,
            residual,
            done: false,
        }
    }

    /// Walk direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.stream.direction()
    }

    /// Continues the walk from `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying stream fails.
    pub fn seek(&mut self, position: Position) -> CoreResult<()> {
        self.done = false;
        self.stream.seek(position)
    }

    fn advance(&mut self) -> CoreResult<Option<Entry>> {
        let conn = self.conn;
        let data = &conn.stores()?.data;
        while let Some(position) = self.stream.next_position()? {
            // Removed since the stream produced it.
            let Some(entry) = data.get(position)? else {
                continue;
            };
            if self.residual.as_ref().map_or(true, |f| f.matches(entry.fields())) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

impl Iterator for Entries<'_> {
    type Item = CoreResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) if err.is_read_only() => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl fmt::Debug for Entries<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entries")
            .field("direction", &self.direction())
            .field("residual", &self.residual)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use crate::connection::ConnectionRegistry;
    use crate::index::IndexKind;
    use binlog_codec::Value;
    use tempfile::{tempdir, TempDir};

    fn open(config: LogConfig) -> (TempDir, ConnectionRegistry, Connection) {
        let dir = tempdir().unwrap();
        let registry = ConnectionRegistry::new();
        let conn = registry
            .open(dir.path(), config.map_size(16 * 1024 * 1024))
            .unwrap();
        (dir, registry, conn)
    }

    fn with_entries(count: i64) -> (TempDir, ConnectionRegistry, Connection) {
        let (dir, registry, conn) = open(LogConfig::new());
        conn.bulk_create((0..count).map(|i| Entry::default().with("idx", i)))
            .unwrap();
        (dir, registry, conn)
    }

    fn indexes(entries: impl Iterator<Item = CoreResult<Entry>>) -> Vec<i64> {
        entries
            .map(|entry| entry.unwrap().get("idx").and_then(Value::as_integer).unwrap())
            .collect()
    }

    #[test]
    fn acknowledged_entries_are_skipped_and_committed() {
        let (_dir, _registry, conn) = with_entries(100);
        conn.register_reader("r").unwrap();

        let reader = conn.reader(Some("r")).unwrap();
        for p in [3u64, 4, 5] {
            assert!(reader.ack(p).unwrap());
        }
        assert!(!reader.ack(4u64).unwrap());
        let expected: Vec<i64> = (0..100).filter(|i| !(3..=5).contains(i)).collect();
        assert_eq!(indexes(reader.iter().unwrap()), expected);
        reader.close().unwrap();

        let reader = conn.reader(Some("r")).unwrap();
        assert_eq!(indexes(reader.iter().unwrap()), expected);
        assert_eq!(reader.pending().unwrap(), 97);
        assert!(reader.is_acked(4u64).unwrap());
    }

    #[test]
    fn commit_moves_pending_acks_to_disk() {
        let (_dir, _registry, conn) = with_entries(10);
        conn.register_reader("a.b").unwrap();
        let reader = conn.reader(Some("a.b")).unwrap();
        let mut live = reader.iter().unwrap();
        assert_eq!(live.next().unwrap().unwrap().position(), Some(0));

        reader.recursive_ack(1u64).unwrap();
        reader.ack(2u64).unwrap();
        reader.commit().unwrap();
        assert!(reader.levels.iter().all(|level| level.delta.borrow().is_empty()));
        assert!(reader.is_acked(1u64).unwrap());
        assert!(reader.is_acked(2u64).unwrap());
        assert_eq!(live.next().unwrap().unwrap().position(), Some(3));

        reader.ack(5u64).unwrap();
        assert_eq!(reader.own().unwrap().delta.borrow().segments().len(), 1);
        reader.commit().unwrap();
        drop(live);
        reader.close().unwrap();

        let parent = conn.reader(Some("a")).unwrap();
        assert!(parent.is_acked(1u64).unwrap());
        assert!(!parent.is_acked(2u64).unwrap());
        let reader = conn.reader(Some("a.b")).unwrap();
        assert_eq!(reader.pending().unwrap(), 7);
    }

    #[test]
    fn acknowledging_while_iterating() {
        let (_dir, _registry, conn) = with_entries(6);
        conn.register_reader("r").unwrap();
        let reader = conn.reader(Some("r")).unwrap();

        let mut seen = Vec::new();
        for entry in reader.iter().unwrap() {
            let entry = entry.unwrap();
            seen.push(entry.position().unwrap());
            reader.ack(&entry).unwrap();
            reader.ack(entry.position().unwrap() + 1).unwrap();
        }
        assert_eq!(seen, vec![0, 2, 4]);
        assert_eq!(reader.pending().unwrap(), 0);
    }

    #[test]
    fn uncommitted_acks_are_private_to_the_instance() {
        let (_dir, _registry, conn) = with_entries(3);
        conn.register_reader("r").unwrap();
        let a = conn.reader(Some("r")).unwrap();
        let b = conn.reader(Some("r")).unwrap();

        a.ack(0u64).unwrap();
        assert_eq!(indexes(b.iter().unwrap()), vec![0, 1, 2]);
        a.commit().unwrap();
        assert_eq!(indexes(b.iter().unwrap()), vec![1, 2]);
    }

    #[test]
    fn dropping_a_reader_commits() {
        let (_dir, _registry, conn) = with_entries(3);
        conn.register_reader("r").unwrap();
        {
            let reader = conn.reader(Some("r")).unwrap();
            reader.ack(1u64).unwrap();
        }
        let reader = conn.reader(Some("r")).unwrap();
        assert_eq!(indexes(reader.iter().unwrap()), vec![0, 2]);
    }

    #[test]
    fn anonymous_readers_see_everything_and_cannot_ack() {
        let (_dir, _registry, conn) = with_entries(3);
        let reader = conn.reader(None).unwrap();
        assert!(reader.is_anonymous());
        assert!(matches!(reader.ack(0u64), Err(CoreError::AnonymousReader)));
        assert!(matches!(
            reader.ack_from_filter(&Filter::new(), false, None),
            Err(CoreError::AnonymousReader)
        ));
        assert_eq!(indexes(reader.iter_rev().unwrap()), vec![2, 1, 0]);
        assert!(!reader.is_acked(0u64).unwrap());
    }

    #[test]
    fn unknown_and_unsaved_targets_are_rejected() {
        let (_dir, _registry, conn) = with_entries(1);
        assert!(matches!(conn.reader(Some("ghost")), Err(CoreError::ReaderDoesNotExist { .. })));

        conn.register_reader("r").unwrap();
        let reader = conn.reader(Some("r")).unwrap();
        let unsaved = Entry::default().with("idx", 9i64);
        assert!(matches!(reader.ack(&unsaved), Err(CoreError::InvalidValue { .. })));
    }

    #[test]
    fn recursive_ack_reaches_every_ancestor() {
        let (_dir, _registry, conn) = with_entries(10);
        conn.register_reader("p.c").unwrap();
        conn.register_reader("p.sibling").unwrap();

        let child = conn.reader(Some("p.c")).unwrap();
        assert!(child.recursive_ack(7u64).unwrap());
        assert!(!child.recursive_ack(7u64).unwrap());
        child.ack(2u64).unwrap();
        child.close().unwrap();

        let parent = conn.reader(Some("p")).unwrap();
        assert!(parent.is_acked(7u64).unwrap());
        assert!(!parent.is_acked(2u64).unwrap());
        assert!(conn.reader(Some("p.c")).unwrap().is_acked(7u64).unwrap());
        assert!(!conn.reader(Some("p.sibling")).unwrap().is_acked(7u64).unwrap());
    }

    #[test]
    fn filters_use_indexes_and_residual_predicates() {
        let (_dir, _registry, conn) = open(LogConfig::new().index("kind", IndexKind::Text));
        let kinds = ["a", "b", "a", "c", "a", "b"];
        conn.bulk_create(
            kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| Entry::default().with("kind", *kind).with("idx", i as i64).with("odd", i % 2 == 1)),
        )
        .unwrap();
        conn.register_reader("r").unwrap();
        let reader = conn.reader(Some("r")).unwrap();

        let only_a = Filter::new().eq("kind", "a");
        assert_eq!(indexes(reader.filter(&only_a).unwrap()), vec![0, 2, 4]);
        assert_eq!(indexes(reader.filter_rev(&only_a).unwrap()), vec![4, 2, 0]);

        let a_or_b = Filter::new().any_of("kind", ["a", "b"]).eq("odd", true);
        assert_eq!(indexes(reader.filter(&a_or_b).unwrap()), vec![1, 5]);

        let unindexed = Filter::new().eq("idx", 3i64);
        assert_eq!(indexes(reader.filter(&unindexed).unwrap()), vec![3]);

        let wrong_kind = Filter::new().eq("kind", 3i64);
        assert!(indexes(reader.filter(&wrong_kind).unwrap()).is_empty());

        reader.ack(2u64).unwrap();
        assert_eq!(indexes(reader.filter(&only_a).unwrap()), vec![0, 4]);
    }

    #[test]
    fn ack_from_filter_resumes_from_its_hint() {
        let (_dir, _registry, conn) = open(LogConfig::new().index("kind", IndexKind::Text));
        let kinds = ["a", "b", "a", "a", "b", "a"];
        conn.bulk_create(kinds.iter().map(|kind| Entry::default().with("kind", *kind)))
            .unwrap();
        conn.register_reader("r").unwrap();
        let only_a = Filter::new().eq("kind", "a");

        let reader = conn.reader(Some("r")).unwrap();
        assert_eq!(reader.ack_from_filter(&only_a, false, Some(2)).unwrap(), 2);
        reader.close().unwrap();

        let signature = only_a.signature().unwrap();
        let stores = conn.stores().unwrap();
        assert_eq!(stores.readers.hint("r", &signature).unwrap(), Some(2));

        let reader = conn.reader(Some("r")).unwrap();
        assert_eq!(reader.ack_from_filter(&only_a, false, None).unwrap(), 2);
        reader.close().unwrap();
        assert_eq!(stores.readers.hint("r", &signature).unwrap(), Some(5));

        let reader = conn.reader(Some("r")).unwrap();
        assert_eq!(reader.ack_from_filter(&only_a, false, None).unwrap(), 0);
        let left: Vec<_> = reader.iter().unwrap().map(|e| e.unwrap().position().unwrap()).collect();
        assert_eq!(left, vec![1, 4]);
    }

    #[test]
    fn recursive_ack_from_filter_reaches_ancestors() {
        let (_dir, _registry, conn) = with_entries(4);
        conn.register_reader("p.c").unwrap();
        let child = conn.reader(Some("p.c")).unwrap();
        assert_eq!(child.ack_from_filter(&Filter::new().eq("idx", 1i64), true, None).unwrap(), 1);
        child.close().unwrap();

        let parent = conn.reader(Some("p")).unwrap();
        assert_eq!(indexes(parent.iter().unwrap()), vec![0, 2, 3]);
    }

    #[test]
    fn get_addresses_by_position_and_from_the_end() {
        let (_dir, _registry, conn) = with_entries(10);
        conn.register_reader("r").unwrap();
        let reader = conn.reader(Some("r")).unwrap();
        reader.ack(9u64).unwrap();

        assert_eq!(reader.get(-1).unwrap(), reader.get(9).unwrap());
        assert_eq!(reader.get(-10).unwrap().position(), Some(0));
        assert!(matches!(reader.get(-11), Err(CoreError::IndexOutOfRange { index: -11 })));
        assert!(matches!(reader.get(10), Err(CoreError::IndexOutOfRange { index: 10 })));
    }

    fn sequence_slice(len: i64, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<i64> {
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

    #[test]
    fn slices_behave_like_sequence_slices() {
        let (_dir, _registry, conn) = with_entries(4);
        let reader = conn.reader(None).unwrap();
        let bounds: Vec<Option<i64>> = std::iter::once(None).chain((-6..6).map(Some)).collect();

        for &start in &bounds {
            for &stop in &bounds {
                for step in [-3, -2, -1, 1, 2, 3] {
                    let slice = Slice { start, stop, step };
                    let got = indexes(reader.slice(slice).unwrap());
                    assert_eq!(got, sequence_slice(4, start, stop, step), "{slice:?}");
                }
            }
        }
    }

    #[test]
    fn reversed_slice_matches_reverse_iteration() {
        let (_dir, _registry, conn) = with_entries(10);
        let reader = conn.reader(None).unwrap();
        let reversed = indexes(reader.slice(Slice::new().step(-1)).unwrap());
        assert_eq!(reversed, indexes(reader.iter_rev().unwrap()));
        assert!(matches!(reader.slice(Slice::new().step(0)), Err(CoreError::InvalidValue { .. })));
    }

    #[test]
    fn closed_connection_stops_readers() {
        let (_dir, _registry, mut conn) = with_entries(2);
        conn.close().unwrap();
        assert!(matches!(conn.reader(None), Err(CoreError::BadUsage { .. })));
    }

    #[test]
    fn removed_entries_are_skipped() {
        let (_dir, _registry, conn) = with_entries(4);
        conn.register_reader("r").unwrap();
        let reader = conn.reader(Some("r")).unwrap();
        reader.ack(1u64).unwrap();
        reader.commit().unwrap();
        assert!(conn.remove(1u64).unwrap());
        assert_eq!(indexes(reader.iter().unwrap()), vec![0, 2, 3]);
    }
}
