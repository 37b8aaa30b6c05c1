//! Walking segment sets as position streams.

use super::IterSeek;
use crate::error::CoreResult;
use crate::registry::Registry;
use crate::segment::Segment;
use crate::types::{Direction, Position, MAX, MIN};
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

/// A set of positions that can be queried one segment at a time.
pub trait SegmentSource {
    /// Returns the segment holding `position` or, failing that, the
    /// nearest segment after it in `direction`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn locate(&mut self, position: Position, direction: Direction) -> CoreResult<Option<Segment>>;

    /// Changes whenever the set changes, so walks can drop cached segments.
    fn version(&self) -> u64 {
        0
    }
}

impl SegmentSource for &Registry {
    fn locate(&mut self, position: Position, direction: Direction) -> CoreResult<Option<Segment>> {
        Ok(Registry::locate(*self, position, direction))
    }
}

impl SegmentSource for Registry {
    fn locate(&mut self, position: Position, direction: Direction) -> CoreResult<Option<Segment>> {
        Ok(Registry::locate(self, position, direction))
    }
}

#[derive(Debug, Default)]
struct SharedState {
    registry: RefCell<Registry>,
    version: Cell<u64>,
}

/// A registry shared between a reader and the streams walking it.
///
/// Acknowledgments added through one handle are seen by every stream
/// built from a clone of it, including streams already in progress.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Rc<SharedState>);

impl SharedRegistry {
    /// Wraps `registry`.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self(Rc::new(SharedState {
            registry: RefCell::new(registry),
            version: Cell::new(0),
        }))
    }

    /// Borrows the registry.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, Registry> {
        self.0.registry.borrow()
    }

    /// Adds a position, see [`Registry::add`].
    ///
    /// # Errors
    ///
    /// Returns an error if the registry rejects the position.
    pub fn add(&self, position: Position) -> CoreResult<bool> {
        let changed = self.0.registry.borrow_mut().add(position)?;
        if changed {
            self.bump();
        }
        Ok(changed)
    }

    /// Returns true if the registry holds `position`.
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        self.0.registry.borrow().contains(position)
    }

    /// Replaces the registry with an empty one, returning the old contents.
    pub fn take(&self) -> Registry {
        self.bump();
        self.0.registry.take()
    }

    fn bump(&self) {
        self.0.version.set(self.0.version.get().wrapping_add(1));
    }
}

impl SegmentSource for SharedRegistry {
    fn locate(&mut self, position: Position, direction: Direction) -> CoreResult<Option<Segment>> {
        Ok(self.0.registry.borrow().locate(position, direction))
    }

    fn version(&self) -> u64 {
        self.0.version.get()
    }
}

/// The complement of a segment source within `[MIN, MAX]`.
#[derive(Debug, Clone)]
pub struct Gaps<S>(S);

impl<S: SegmentSource> Gaps<S> {
    /// Wraps `source`.
    pub fn new(source: S) -> Self {
        Self(source)
    }

    fn forward(&mut self, position: Position) -> CoreResult<Option<Segment>> {
        match self.0.locate(position, Direction::Forward)? {
            Some(taken) if taken.contains(position) => {
                let Some(start) = taken.right().checked_add(1) else {
                    return Ok(None);
                };
                let end = match self.0.locate(start, Direction::Forward)? {
                    Some(next) => next.left().saturating_sub(1),
                    None => MAX,
                };
                Segment::new(start, end).map(Some)
            }
            Some(next) => {
                let start = self.after_previous(position)?;
                Segment::new(start, next.left() - 1).map(Some)
            }
            None => {
                let start = self.after_previous(position)?;
                Segment::new(start, MAX).map(Some)
            }
        }
    }

    fn backward(&mut self, position: Position) -> CoreResult<Option<Segment>> {
        match self.0.locate(position, Direction::Backward)? {
            Some(taken) if taken.contains(position) => {
                let Some(end) = taken.left().checked_sub(1) else {
                    return Ok(None);
                };
                let start = match self.0.locate(end, Direction::Backward)? {
                    Some(previous) => previous.right().saturating_add(1),
                    None => MIN,
                };
                Segment::new(start, end).map(Some)
            }
            Some(previous) => {
                let end = self.before_next(position)?;
                Segment::new(previous.right() + 1, end).map(Some)
            }
            None => {
                let end = self.before_next(position)?;
                Segment::new(MIN, end).map(Some)
            }
        }
    }

    // Only called for positions outside the set, so the neighbours found
    // end below (or start above) `position`.
    fn after_previous(&mut self, position: Position) -> CoreResult<Position> {
        Ok(self
            .0
            .locate(position, Direction::Backward)?
            .map_or(MIN, |previous| previous.right() + 1))
    }

    fn before_next(&mut self, position: Position) -> CoreResult<Position> {
        Ok(self
            .0
            .locate(position, Direction::Forward)?
            .map_or(MAX, |next| next.left() - 1))
    }
}

impl<S: SegmentSource> SegmentSource for Gaps<S> {
    fn locate(&mut self, position: Position, direction: Direction) -> CoreResult<Option<Segment>> {
        match direction {
            Direction::Forward => self.forward(position),
            Direction::Backward => self.backward(position),
        }
    }

    fn version(&self) -> u64 {
        self.0.version()
    }
}

/// Walks the members of a [`SegmentSource`] in one direction.
///
/// The segment holding the cursor is cached, so consecutive members of a
/// segment cost a single lookup.
#[derive(Debug, Clone)]
pub struct SegmentWalk<S> {
    source: S,
    direction: Direction,
    cursor: Option<Position>,
    current: Option<Segment>,
    version: u64,
}

impl<S: SegmentSource> SegmentWalk<S> {
    /// Starts a walk over `source` from the beginning of the domain.
    pub fn new(source: S, direction: Direction) -> Self {
        let version = source.version();
        Self {
            source,
            direction,
            cursor: Some(direction.start()),
            current: None,
            version,
        }
    }
}

impl<S: SegmentSource> IterSeek for SegmentWalk<S> {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn seek(&mut self, position: Position) -> CoreResult<()> {
        self.cursor = Some(position);
        Ok(())
    }

    fn next_position(&mut self) -> CoreResult<Option<Position>> {
        let Some(position) = self.cursor else {
            return Ok(None);
        };
        let version = self.source.version();
        if version != self.version {
            self.current = None;
            self.version = version;
        }

        let segment = match self.current {
            Some(segment) if segment.contains(position) => segment,
            _ => match self.source.locate(position, self.direction)? {
                Some(segment) => {
                    self.current = Some(segment);
                    segment
                }
                None => {
                    self.cursor = None;
                    return Ok(None);
                }
            },
        };

        let value = match self.direction {
            Direction::Forward => position.max(segment.left()),
            Direction::Backward => position.min(segment.right()),
        };
        self.cursor = self.direction.step(value);
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry(positions: &[Position]) -> Registry {
        let mut r = Registry::new();
        for &p in positions {
            r.add(p).unwrap();
        }
        r
    }

    fn drain<S: IterSeek>(stream: &mut S, limit: usize) -> Vec<Position> {
        let mut out = Vec::new();
        while out.len() < limit {
            match stream.next_position().unwrap() {
                Some(p) => out.push(p),
                None => break,
            }
        }
        out
    }

    #[test]
    fn seek_into_segment_and_gap() {
        let r = registry(&[2, 3, 4, 10, 11]);
        let mut walk = r.iter_seek(Direction::Forward);

        walk.seek(3).unwrap();
        assert_eq!(drain(&mut walk, 10), vec![3, 4, 10, 11]);

        walk.seek(6).unwrap();
        assert_eq!(drain(&mut walk, 10), vec![10, 11]);

        walk.seek(12).unwrap();
        assert_eq!(drain(&mut walk, 10), Vec::<Position>::new());

        // Seeking back restarts an exhausted walk.
        walk.seek(0).unwrap();
        assert_eq!(drain(&mut walk, 2), vec![2, 3]);
    }

    #[test]
    fn backward_walk_and_seek() {
        let r = registry(&[2, 3, 4, 10, 11]);
        let mut walk = r.iter_seek(Direction::Backward);
        assert_eq!(drain(&mut walk, 10), vec![11, 10, 4, 3, 2]);

        walk.seek(9).unwrap();
        assert_eq!(drain(&mut walk, 10), vec![4, 3, 2]);

        walk.seek(1).unwrap();
        assert_eq!(drain(&mut walk, 10), Vec::<Position>::new());
    }

    #[test]
    fn walk_stops_at_domain_edges() {
        let r = registry(&[MAX - 1, MAX]);
        let mut walk = r.iter_seek(Direction::Forward);
        assert_eq!(drain(&mut walk, 10), vec![MAX - 1, MAX]);

        let r = registry(&[MIN, MIN + 1]);
        let mut walk = r.iter_seek(Direction::Backward);
        assert_eq!(drain(&mut walk, 10), vec![1, 0]);
    }

    #[test]
    fn gaps_walk_the_complement() {
        let r = registry(&[0, 1, 4, 6, 7]);
        let mut walk = SegmentWalk::new(Gaps::new(&r), Direction::Forward);
        assert_eq!(drain(&mut walk, 5), vec![2, 3, 5, 8, 9]);

        let r = registry(&[MAX - 1]);
        let mut walk = SegmentWalk::new(Gaps::new(&r), Direction::Backward);
        assert_eq!(drain(&mut walk, 3), vec![MAX, MAX - 2, MAX - 3]);
    }

    #[test]
    fn gaps_of_full_domain_are_empty() {
        let r = Registry::new().invert();
        let mut walk = SegmentWalk::new(Gaps::new(&r), Direction::Forward);
        assert_eq!(walk.next_position().unwrap(), None);
    }

    #[test]
    fn shared_registry_updates_are_seen_mid_walk() {
        let shared = SharedRegistry::new(registry(&[1, 2]));
        let mut walk = SegmentWalk::new(shared.clone(), Direction::Forward);
        assert_eq!(walk.next_position().unwrap(), Some(1));

        shared.add(3).unwrap();
        shared.add(9).unwrap();
        assert_eq!(drain(&mut walk, 10), vec![2, 3, 9]);

        let mut unacked = SegmentWalk::new(Gaps::new(shared.clone()), Direction::Forward);
        assert_eq!(drain(&mut unacked, 3), vec![0, 4, 5]);
        shared.add(7).unwrap();
        assert_eq!(drain(&mut unacked, 2), vec![6, 8]);
    }

    proptest! {
        #[test]
        fn gaps_locate_like_inverted_registry(
            values in prop::collection::vec(prop_oneof![0u64..64, (MAX - 64)..=MAX], 0..40),
            probes in prop::collection::vec(prop_oneof![0u64..70, (MAX - 70)..=MAX], 1..20),
        ) {
            let r = registry(&values);
            let inverted = r.invert();
            let mut gaps = Gaps::new(&r);
            for p in probes {
                for direction in [Direction::Forward, Direction::Backward] {
                    prop_assert_eq!(
                        gaps.locate(p, direction).unwrap(),
                        inverted.locate(p, direction)
                    );
                }
            }
        }

        #[test]
        fn seek_then_walk_yields_suffix(
            values in prop::collection::btree_set(0u64..100, 0..50),
            target in 0u64..110,
        ) {
            let r = registry(&values.iter().copied().collect::<Vec<_>>());

            let mut walk = r.iter_seek(Direction::Forward);
            walk.seek(target).unwrap();
            let expected: Vec<_> = values.range(target..).copied().collect();
            prop_assert_eq!(drain(&mut walk, 200), expected);

            let mut walk = r.iter_seek(Direction::Backward);
            walk.seek(target).unwrap();
            let expected: Vec<_> = values.range(..=target).rev().copied().collect();
            prop_assert_eq!(drain(&mut walk, 200), expected);
        }
    }
}
