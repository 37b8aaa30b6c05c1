//! Slicing a reader by position.
//!
//! Bounds follow the usual sequence-slice rules: `start` is inclusive,
//! `stop` exclusive, and negative bounds count back from the last live
//! entry (`-1` is the last one). A negative `step` walks backwards.

use super::Entries;
use crate::entry::Entry;
use crate::error::{CoreError, CoreResult};
use crate::types::{Direction, Position};

/// Bounds and stride of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    /// First index, inclusive.
    pub start: Option<i64>,
    /// Last index, exclusive.
    pub stop: Option<i64>,
    /// Stride; negative walks backwards. Zero is rejected.
    pub step: i64,
}

impl Default for Slice {
    fn default() -> Self {
        Self {
            start: None,
            stop: None,
            step: 1,
        }
    }
}

impl Slice {
    /// The whole log, forward.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start bound.
    #[must_use]
    pub const fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the stop bound.
    #[must_use]
    pub const fn stop(mut self, stop: i64) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Sets the stride.
    #[must_use]
    pub const fn step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }

    pub(crate) fn direction(&self) -> CoreResult<Direction> {
        match self.step {
            0 => Err(CoreError::invalid_value("slice step cannot be zero")),
            s if s > 0 => Ok(Direction::Forward),
            _ => Ok(Direction::Backward),
        }
    }
}

/// A slice bound mapped onto positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bound {
    /// Not given.
    Open,
    /// A position.
    At(Position),
    /// A negative index reaching past the first live entry.
    BeforeFirst,
}

impl Bound {
    /// Resolves `index`, looking negative ones up with `nth_from_end`.
    pub(crate) fn resolve(
        index: Option<i64>,
        nth_from_end: impl FnOnce(usize) -> CoreResult<Option<Position>>,
    ) -> CoreResult<Self> {
        match index {
            None => Ok(Self::Open),
            Some(i) if i >= 0 => Ok(Self::At(i.unsigned_abs())),
            Some(i) => {
                let Ok(n) = usize::try_from(i.unsigned_abs() - 1) else {
                    return Ok(Self::BeforeFirst);
                };
                Ok(nth_from_end(n)?.map_or(Self::BeforeFirst, Self::At))
            }
        }
    }
}

/// Where a sliced walk starts and stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Plan {
    pub(crate) seek: Option<Position>,
    pub(crate) stop: Option<Position>,
    pub(crate) empty: bool,
}

impl Plan {
    pub(crate) fn new(direction: Direction, start: Bound, stop: Bound) -> Self {
        let mut plan = Plan {
            seek: None,
            stop: None,
            empty: false,
        };
        match start {
            Bound::At(p) => plan.seek = Some(p),
            Bound::BeforeFirst if !direction.is_forward() => plan.empty = true,
            Bound::BeforeFirst | Bound::Open => {}
        }
        match stop {
            Bound::At(p) => plan.stop = Some(p),
            Bound::BeforeFirst if direction.is_forward() => plan.empty = true,
            Bound::BeforeFirst | Bound::Open => {}
        }
        plan
    }
}

/// Entries of a slice, in slice order.
pub struct SliceEntries<'c> {
    inner: Option<Entries<'c>>,
    direction: Direction,
    stop: Option<Position>,
    stride: u64,
    skip: u64,
}

impl<'c> SliceEntries<'c> {
    pub(crate) fn new(mut inner: Entries<'c>, slice: &Slice, plan: Plan) -> CoreResult<Self> {
        let direction = slice.direction()?;
        if let Some(position) = plan.seek {
            inner.seek(position)?;
        }
        Ok(Self {
            inner: (!plan.empty).then_some(inner),
            direction,
            stop: plan.stop,
            stride: slice.step.unsigned_abs(),
            skip: 0,
        })
    }
}

impl Iterator for SliceEntries<'_> {
    type Item = CoreResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.as_mut()?.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.inner = None;
                    return Some(Err(err));
                }
            };
            let reached_stop = match (entry.position(), self.stop) {
                (Some(position), Some(stop)) => !self.direction.precedes(position, stop),
                _ => false,
            };
            if reached_stop {
                self.inner = None;
                return None;
            }
            if self.skip == 0 {
                self.skip = self.stride - 1;
                return Some(Ok(entry));
            }
            self.skip -= 1;
        }
    }
}

impl std::fmt::Debug for SliceEntries<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceEntries")
            .field("direction", &self.direction)
            .field("stop", &self.stop)
            .field("stride", &self.stride)
            .field("done", &self.inner.is_none())
            .finish()
    }
}
