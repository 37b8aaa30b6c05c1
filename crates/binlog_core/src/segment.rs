//! Closed position intervals.

use crate::error::{CoreError, CoreResult};
use crate::types::Position;
use std::fmt;
use std::ops::RangeInclusive;

/// A closed interval `[left, right]` of positions, `left <= right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    left: Position,
    right: Position,
}

impl Segment {
    /// Creates the segment `[left, right]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidValue`] if `left > right`.
    pub fn new(left: Position, right: Position) -> CoreResult<Self> {
        if left > right {
            return Err(CoreError::invalid_value(format!(
                "segment [{left}, {right}] is empty"
            )));
        }
        Ok(Self { left, right })
    }

    /// Creates the segment holding only `position`.
    #[must_use]
    pub const fn single(position: Position) -> Self {
        Self {
            left: position,
            right: position,
        }
    }

    pub(crate) const fn new_unchecked(left: Position, right: Position) -> Self {
        debug_assert!(left <= right);
        Self { left, right }
    }

    /// Lower bound.
    #[must_use]
    pub const fn left(&self) -> Position {
        self.left
    }

    /// Upper bound.
    #[must_use]
    pub const fn right(&self) -> Position {
        self.right
    }

    pub(crate) fn set_left(&mut self, left: Position) {
        debug_assert!(left <= self.right);
        self.left = left;
    }

    pub(crate) fn set_right(&mut self, right: Position) {
        debug_assert!(self.left <= right);
        self.right = right;
    }

    /// Returns true if `left <= position <= right`.
    #[must_use]
    pub const fn contains(&self, position: Position) -> bool {
        self.left <= position && position <= self.right
    }

    /// Returns the overlap of two segments, if any.
    #[must_use]
    pub fn intersect(&self, other: &Segment) -> Option<Segment> {
        let left = self.left.max(other.left);
        let right = self.right.min(other.right);
        (left <= right).then_some(Segment { left, right })
    }

    /// Number of positions in the segment.
    #[must_use]
    pub fn len(&self) -> u128 {
        u128::from(self.right - self.left) + 1
    }

    /// Segments are never empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Iterates the members in ascending order; `.rev()` walks them backwards.
    #[must_use]
    pub fn members(&self) -> RangeInclusive<Position> {
        self.left..=self.right
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.left, self.right)
    }
}
