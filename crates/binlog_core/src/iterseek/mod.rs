//! # Seekable position streams
//!
//! An [`IterSeek`] produces positions in a fixed [`Direction`] and can be
//! repositioned at any time with [`IterSeek::seek`]. Every source of
//! positions in the log implements it:
//!
//! - in-memory registries and their complements ([`SegmentWalk`], [`Gaps`])
//! - on-disk registries ([`crate::db_registry`])
//! - the entries table and secondary index postings
//! - the [`And`] / [`Or`] combinators over any of the above
//!
//! ## Design Principles
//!
//! - Output is strictly monotonic in the stream's direction
//! - `seek(p)` makes the next value the first match `>= p` (forward) or `<= p` (backward)
//! - Seeking is absolute: it may move backwards and restarts an exhausted stream
//! - Storage failures are returned, never swallowed

mod ops;
mod walk;

pub use ops::{And, Or};
pub use walk::{Gaps, SegmentSource, SegmentWalk, SharedRegistry};

use crate::error::CoreResult;
use crate::types::{Direction, Position};

/// A direction-tagged, seekable producer of positions.
pub trait IterSeek {
    /// Direction positions are produced in.
    fn direction(&self) -> Direction;

    /// Repositions the stream so the next value is the first match at or
    /// after `position` in the stream's direction.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source fails.
    fn seek(&mut self, position: Position) -> CoreResult<()>;

    /// Returns the next matching position, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source fails.
    fn next_position(&mut self) -> CoreResult<Option<Position>>;

    /// Adapts the stream into a standard iterator.
    fn positions(self) -> Positions<Self>
    where
        Self: Sized,
    {
        Positions {
            inner: self,
            done: false,
        }
    }
}

/// A boxed [`IterSeek`], as held by the combinators.
pub type BoxedSeek<'a> = Box<dyn IterSeek + 'a>;

impl<S: IterSeek + ?Sized> IterSeek for Box<S> {
    fn direction(&self) -> Direction {
        (**self).direction()
    }

    fn seek(&mut self, position: Position) -> CoreResult<()> {
        (**self).seek(position)
    }

    fn next_position(&mut self) -> CoreResult<Option<Position>> {
        (**self).next_position()
    }
}

/// Iterator over the positions of an [`IterSeek`].
///
/// Stops after the first error.
#[derive(Debug)]
pub struct Positions<S> {
    inner: S,
    done: bool,
}

impl<S> Positions<S> {
    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: IterSeek> Iterator for Positions<S> {
    type Item = CoreResult<Position>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next_position() {
            Ok(Some(position)) => Some(Ok(position)),
            Ok(None) => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn registry(positions: &[Position]) -> Registry {
        let mut r = Registry::new();
        for &p in positions {
            r.add(p).unwrap();
        }
        r
    }

    #[test]
    fn positions_adapter_collects() {
        let r = registry(&[1, 2, 3, 7]);
        let forward: Vec<_> = r
            .iter_seek(Direction::Forward)
            .positions()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(forward, vec![1, 2, 3, 7]);

        let backward: Vec<_> = r
            .iter_seek(Direction::Backward)
            .positions()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(backward, vec![7, 3, 2, 1]);
    }

    #[test]
    fn boxed_streams_delegate() {
        let r = registry(&[4, 5]);
        let mut boxed: BoxedSeek<'_> = Box::new(r.iter_seek(Direction::Forward));
        assert_eq!(boxed.direction(), Direction::Forward);
        boxed.seek(5).unwrap();
        assert_eq!(boxed.next_position().unwrap(), Some(5));
        assert_eq!(boxed.next_position().unwrap(), None);
    }
}
