//! Interval sets of acknowledged positions.
//!
//! A [`Registry`] stores a set of positions as a sorted list of
//! [`Segment`]s. After every operation the list is:
//!
//! - sorted by left bound
//! - pairwise disjoint
//! - non-adjacent (no two segments could be fused into one)
//!
//! Acknowledgments are mostly appended in order, so the list stays short
//! even for long-lived readers.

use crate::error::{CoreError, CoreResult};
use crate::iterseek::SegmentWalk;
use crate::segment::Segment;
use crate::types::{Direction, Position, MAX, MIN};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// A set of positions stored as sorted, disjoint, non-adjacent segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    segments: Vec<Segment>,
    initial: Option<Position>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry rejecting positions below `initial`.
    #[must_use]
    pub fn with_baseline(initial: Position) -> Self {
        Self {
            segments: Vec::new(),
            initial: Some(initial),
        }
    }

    /// Builds a registry from an already normalized segment list.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidValue`] if the segments are unsorted,
    /// overlapping or adjacent.
    pub fn from_segments(segments: Vec<Segment>) -> CoreResult<Self> {
        for pair in segments.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.right() >= b.left() || a.right() + 1 == b.left() {
                return Err(CoreError::invalid_value(format!(
                    "segments {a} and {b} are not sorted, disjoint and non-adjacent"
                )));
            }
        }
        Ok(Self {
            segments,
            initial: None,
        })
    }

    /// The segments, sorted by left bound.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Baseline below which [`Registry::add`] rejects positions.
    #[must_use]
    pub fn initial(&self) -> Option<Position> {
        self.initial
    }

    /// Returns true if no position is in the set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of positions in the set.
    #[must_use]
    pub fn len(&self) -> u128 {
        self.segments.iter().map(Segment::len).sum()
    }

    /// Adds `position` to the set, returning whether the set changed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidValue`] if `position` is below the baseline.
    pub fn add(&mut self, position: Position) -> CoreResult<bool> {
        if let Some(initial) = self.initial {
            if position < initial {
                return Err(CoreError::invalid_value(format!(
                    "position {position} is below the registry baseline {initial}"
                )));
            }
        }

        // First segment ending at or after `position`.
        let i = self.segments.partition_point(|s| s.right() < position);
        if self.segments.get(i).is_some_and(|s| s.contains(position)) {
            return Ok(false);
        }

        // Here every segment before `i` ends below `position` and segment `i`
        // (if any) starts above it, so the arithmetic cannot overflow.
        let extends_previous = i > 0 && self.segments[i - 1].right() + 1 == position;
        let extends_next = self
            .segments
            .get(i)
            .is_some_and(|s| s.left() == position + 1);

        match (extends_previous, extends_next) {
            (true, true) => {
                let next = self.segments.remove(i);
                self.segments[i - 1].set_right(next.right());
            }
            (true, false) => self.segments[i - 1].set_right(position),
            (false, true) => self.segments[i].set_left(position),
            (false, false) => self.segments.insert(i, Segment::single(position)),
        }
        Ok(true)
    }

    /// Returns true if `position` is in the set.
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        let i = self.segments.partition_point(|s| s.right() < position);
        self.segments.get(i).is_some_and(|s| s.contains(position))
    }

    /// Set union.
    #[must_use]
    pub fn union(&self, other: &Registry) -> Registry {
        let mut merged: Vec<Segment> = Vec::with_capacity(self.segments.len() + other.segments.len());
        let mut a = self.segments.iter().peekable();
        let mut b = other.segments.iter().peekable();

        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(x), Some(y)) if x.left() <= y.left() => a.next(),
                (Some(_), Some(_)) => b.next(),
                (Some(_), None) => a.next(),
                (None, Some(_)) => b.next(),
                (None, None) => break,
            };
            let Some(&next) = next else { break };

            match merged.last_mut() {
                Some(current) if next.left() <= current.right().saturating_add(1) => {
                    if next.right() > current.right() {
                        current.set_right(next.right());
                    }
                }
                _ => merged.push(next),
            }
        }

        Registry {
            segments: merged,
            initial: match (self.initial, other.initial) {
                (Some(x), Some(y)) => Some(x.min(y)),
                _ => None,
            },
        }
    }

    /// Set intersection.
    #[must_use]
    pub fn intersection(&self, other: &Registry) -> Registry {
        let mut common = Vec::new();
        let (mut i, mut j) = (0, 0);

        while let (Some(a), Some(b)) = (self.segments.get(i), other.segments.get(j)) {
            if let Some(overlap) = a.intersect(b) {
                common.push(overlap);
            }
            // Advance whichever ends first; both when they end together.
            if a.right() <= b.right() {
                i += 1;
            }
            if b.right() <= a.right() {
                j += 1;
            }
        }

        Registry {
            segments: common,
            initial: self.initial.max(other.initial),
        }
    }

    /// Complement within `[MIN, MAX]`.
    #[must_use]
    pub fn invert(&self) -> Registry {
        let mut gaps = Vec::with_capacity(self.segments.len() + 1);
        let mut start = Some(MIN);

        for segment in &self.segments {
            if let Some(from) = start {
                if segment.left() > from {
                    gaps.push(Segment::new_unchecked(from, segment.left() - 1));
                }
            }
            start = segment.right().checked_add(1);
        }
        if let Some(from) = start {
            gaps.push(Segment::new_unchecked(from, MAX));
        }

        Registry {
            segments: gaps,
            initial: self.initial,
        }
    }

    /// Walks the set in `direction` as a seekable position stream.
    #[must_use]
    pub fn iter_seek(&self, direction: Direction) -> SegmentWalk<&Registry> {
        SegmentWalk::new(self, direction)
    }

    /// Segment holding `position`, or the nearest one after it in `direction`.
    pub(crate) fn locate(&self, position: Position, direction: Direction) -> Option<Segment> {
        match direction {
            Direction::Forward => {
                let i = self.segments.partition_point(|s| s.right() < position);
                self.segments.get(i).copied()
            }
            Direction::Backward => {
                let i = self.segments.partition_point(|s| s.left() <= position);
                i.checked_sub(1).map(|i| self.segments[i])
            }
        }
    }
}

impl BitOr for &Registry {
    type Output = Registry;

    fn bitor(self, rhs: &Registry) -> Registry {
        self.union(rhs)
    }
}

impl BitAnd for &Registry {
    type Output = Registry;

    fn bitand(self, rhs: &Registry) -> Registry {
        self.intersection(rhs)
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{segment}")?;
        }
        write!(f, "}}")
    }
}
