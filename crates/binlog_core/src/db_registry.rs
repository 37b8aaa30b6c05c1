//! Registries read straight from the readers environment.
//!
//! Every reader's committed registry lives in one shared segments table
//! with one row per segment. A row key is the reader name, a zero byte
//! and the segment's big-endian right bound; the value is its left bound.
//! The rows of one reader are therefore contiguous and ordered by
//! position. Lookups position a cursor with a single range seek and turn
//! the surrounding row into a [`Segment`]; the stored set is never loaded
//! as a whole.
//!
//! [`CachedRegistry`] layers a reader's pending acknowledgments over the
//! committed rows so iteration reflects acks made earlier in the session.

use crate::error::CoreResult;
use crate::iterseek::{And, Gaps, Or, SegmentSource, SegmentWalk, SharedRegistry};
use crate::segment::Segment;
use crate::types::{decode_position, position_key, Direction, Position};
use binlog_storage::{Environment, Pair, Table};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Key prefix of every segment row of `reader`.
pub(crate) fn segment_prefix(reader: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(reader.len() + 1 + 8);
    prefix.extend_from_slice(reader.as_bytes());
    prefix.push(0);
    prefix
}

/// Row key of a segment ending at `end`, under `prefix`.
pub(crate) fn segment_key(prefix: &[u8], end: Position) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&position_key(end));
    key
}

/// Segment lookups against one reader's committed registry.
///
/// A missing segments table reads as an empty registry.
#[derive(Debug, Clone)]
pub struct DiskSegments {
    env: Environment,
    table: Option<Table>,
    prefix: Vec<u8>,
    generation: Arc<AtomicU64>,
}

impl DiskSegments {
    /// Wraps the rows of `reader` in the segments table `table` of `env`.
    ///
    /// `generation` must change whenever a registry is committed.
    pub fn new(env: Environment, table: Option<Table>, reader: &str, generation: Arc<AtomicU64>) -> Self {
        Self {
            env,
            table,
            prefix: segment_prefix(reader),
            generation,
        }
    }

    /// Returns true if `position` is in the committed registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn contains(&mut self, position: Position) -> CoreResult<bool> {
        Ok(self
            .locate(position, Direction::Forward)?
            .is_some_and(|segment| segment.contains(position)))
    }

    // Rows of other readers end the search.
    fn row_segment(&self, row: Option<Pair>) -> CoreResult<Option<Segment>> {
        let Some((key, start)) = row else {
            return Ok(None);
        };
        match key.strip_prefix(self.prefix.as_slice()) {
            Some(end) => Segment::new(decode_position(&start)?, decode_position(end)?).map(Some),
            None => Ok(None),
        }
    }
}

impl SegmentSource for DiskSegments {
    fn locate(&mut self, position: Position, direction: Direction) -> CoreResult<Option<Segment>> {
        let Some(table) = self.table else {
            return Ok(None);
        };
        let txn = self.env.read_txn()?;
        let key = segment_key(&self.prefix, position);

        // First segment ending at or after `position`.
        let after = self.row_segment(table.seek_ge(&txn, &key)?)?;
        match direction {
            Direction::Forward => Ok(after),
            Direction::Backward => match after {
                Some(segment) if segment.contains(position) => Ok(Some(segment)),
                _ => self.row_segment(table.seek_le(&txn, &key)?),
            },
        }
    }

    fn version(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Walks a committed registry.
pub type DiskRegistry = SegmentWalk<DiskSegments>;

/// Walks the complement of a committed registry.
pub type DiskGaps = SegmentWalk<Gaps<DiskSegments>>;

/// A committed registry overlaid with uncommitted acknowledgments.
#[derive(Debug, Clone)]
pub struct CachedRegistry {
    disk: DiskSegments,
    delta: SharedRegistry,
}

impl CachedRegistry {
    /// Overlays `delta` on the committed segments `disk`.
    pub fn new(disk: DiskSegments, delta: SharedRegistry) -> Self {
        Self { disk, delta }
    }

    /// Returns true if `position` is acknowledged, committed or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn contains(&mut self, position: Position) -> CoreResult<bool> {
        if self.delta.contains(position) {
            return Ok(true);
        }
        self.disk.contains(position)
    }

    /// Acknowledged positions: `disk ∪ delta`.
    ///
    /// # Errors
    ///
    /// Propagates combinator construction errors.
    pub fn acked(&self, direction: Direction) -> CoreResult<Or<'static>> {
        Or::pair(
            SegmentWalk::new(self.disk.clone(), direction),
            SegmentWalk::new(self.delta.clone(), direction),
        )
    }

    /// Unacknowledged positions: `gaps(disk) ∩ gaps(delta)`.
    ///
    /// # Errors
    ///
    /// Propagates combinator construction errors.
    pub fn unacked(&self, direction: Direction) -> CoreResult<And<'static>> {
        And::pair(
            SegmentWalk::new(Gaps::new(self.disk.clone()), direction),
            SegmentWalk::new(Gaps::new(self.delta.clone()), direction),
        )
    }
}
