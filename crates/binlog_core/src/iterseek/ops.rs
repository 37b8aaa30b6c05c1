//! Boolean combinators over position streams.

use super::{BoxedSeek, IterSeek};
use crate::error::{CoreError, CoreResult};
use crate::types::{Direction, Position};

fn common_direction(sources: &[BoxedSeek<'_>]) -> CoreResult<Direction> {
    let Some(first) = sources.first() else {
        return Err(CoreError::invalid_value("at least one stream is required"));
    };
    let direction = first.direction();
    if sources.iter().any(|s| s.direction() != direction) {
        return Err(CoreError::DirectionMismatch);
    }
    Ok(direction)
}

/// Positions produced by every source.
///
/// Sorted merge-intersection: a candidate from the first source is checked
/// against every other source by seeking it there; a source that lands
/// further on becomes the new target for the first source.
pub struct And<'a> {
    sources: Vec<BoxedSeek<'a>>,
    direction: Direction,
}

impl<'a> And<'a> {
    /// Intersects `sources`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DirectionMismatch`] if the sources walk in
    /// different directions, or [`CoreError::InvalidValue`] if there are none.
    pub fn new(sources: Vec<BoxedSeek<'a>>) -> CoreResult<Self> {
        let direction = common_direction(&sources)?;
        Ok(Self { sources, direction })
    }

    /// Intersects two streams.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DirectionMismatch`] if the streams walk in different directions.
    pub fn pair(a: impl IterSeek + 'a, b: impl IterSeek + 'a) -> CoreResult<Self> {
        Self::new(vec![Box::new(a), Box::new(b)])
    }
}

impl IterSeek for And<'_> {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn seek(&mut self, position: Position) -> CoreResult<()> {
        for source in &mut self.sources {
            source.seek(position)?;
        }
        Ok(())
    }

    fn next_position(&mut self) -> CoreResult<Option<Position>> {
        let Some((first, rest)) = self.sources.split_first_mut() else {
            return Ok(None);
        };
        let Some(mut candidate) = first.next_position()? else {
            return Ok(None);
        };

        'candidates: loop {
            for source in rest.iter_mut() {
                source.seek(candidate)?;
                match source.next_position()? {
                    None => return Ok(None),
                    Some(found) if found == candidate => {}
                    Some(found) => {
                        first.seek(found)?;
                        match first.next_position()? {
                            Some(next) => {
                                candidate = next;
                                continue 'candidates;
                            }
                            None => return Ok(None),
                        }
                    }
                }
            }
            return Ok(Some(candidate));
        }
    }
}

/// Positions produced by any source.
///
/// Keeps one look-ahead head per source and emits the first of them in
/// the stream's direction. Every source whose head equals the emitted
/// position is advanced, so equal heads are emitted once.
pub struct Or<'a> {
    sources: Vec<BoxedSeek<'a>>,
    heads: Vec<Option<Position>>,
    primed: bool,
    direction: Direction,
}

impl<'a> Or<'a> {
    /// Unites `sources`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DirectionMismatch`] if the sources walk in
    /// different directions, or [`CoreError::InvalidValue`] if there are none.
    pub fn new(sources: Vec<BoxedSeek<'a>>) -> CoreResult<Self> {
        let direction = common_direction(&sources)?;
        Ok(Self {
            heads: vec![None; sources.len()],
            sources,
            primed: false,
            direction,
        })
    }

    /// Unites two streams.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DirectionMismatch`] if the streams walk in different directions.
    pub fn pair(a: impl IterSeek + 'a, b: impl IterSeek + 'a) -> CoreResult<Self> {
        Self::new(vec![Box::new(a), Box::new(b)])
    }
}

impl IterSeek for Or<'_> {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn seek(&mut self, position: Position) -> CoreResult<()> {
        for source in &mut self.sources {
            source.seek(position)?;
        }
        self.primed = false;
        Ok(())
    }

    fn next_position(&mut self) -> CoreResult<Option<Position>> {
        if !self.primed {
            for (head, source) in self.heads.iter_mut().zip(&mut self.sources) {
                *head = source.next_position()?;
            }
            self.primed = true;
        }

        let direction = self.direction;
        let Some(emitted) = self
            .heads
            .iter()
            .flatten()
            .copied()
            .reduce(|a, b| direction.first_of(a, b))
        else {
            return Ok(None);
        };

        for (head, source) in self.heads.iter_mut().zip(&mut self.sources) {
            if *head == Some(emitted) {
                *head = source.next_position()?;
            }
        }
        Ok(Some(emitted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn registry(values: &BTreeSet<Position>) -> Registry {
        let mut r = Registry::new();
        for &v in values {
            r.add(v).unwrap();
        }
        r
    }

    fn set(values: &[Position]) -> BTreeSet<Position> {
        values.iter().copied().collect()
    }

    fn collect(stream: impl IterSeek) -> Vec<Position> {
        stream.positions().collect::<CoreResult<_>>().unwrap()
    }

    fn ordered(values: impl IntoIterator<Item = Position>, direction: Direction) -> Vec<Position> {
        let mut out: Vec<_> = values.into_iter().collect();
        out.sort_unstable();
        if !direction.is_forward() {
            out.reverse();
        }
        out
    }

    #[test]
    fn and_of_two_registries() {
        let a = registry(&set(&[1, 2, 3, 5, 8, 13]));
        let b = registry(&set(&[2, 3, 4, 8, 9]));
        let and = And::pair(a.iter_seek(Direction::Forward), b.iter_seek(Direction::Forward)).unwrap();
        assert_eq!(collect(and), vec![2, 3, 8]);
    }

    #[test]
    fn or_of_two_registries_backward() {
        let a = registry(&set(&[1, 5]));
        let b = registry(&set(&[5, 7]));
        let or = Or::pair(a.iter_seek(Direction::Backward), b.iter_seek(Direction::Backward)).unwrap();
        assert_eq!(collect(or), vec![7, 5, 1]);
    }

    #[test]
    fn mismatched_directions_fail_fast() {
        let a = registry(&set(&[1]));
        let and = And::pair(a.iter_seek(Direction::Forward), a.iter_seek(Direction::Backward));
        assert!(matches!(and, Err(CoreError::DirectionMismatch)));
        let or = Or::pair(a.iter_seek(Direction::Forward), a.iter_seek(Direction::Backward));
        assert!(matches!(or, Err(CoreError::DirectionMismatch)));
    }

    #[test]
    fn empty_source_list_is_rejected() {
        assert!(matches!(And::new(Vec::new()), Err(CoreError::InvalidValue { .. })));
        assert!(matches!(Or::new(Vec::new()), Err(CoreError::InvalidValue { .. })));
    }

    #[test]
    fn reseek_mid_iteration() {
        let a = registry(&set(&[1, 2, 3, 4, 5, 6]));
        let b = registry(&set(&[2, 4, 6]));
        let mut and = And::pair(a.iter_seek(Direction::Forward), b.iter_seek(Direction::Forward)).unwrap();
        assert_eq!(and.next_position().unwrap(), Some(2));
        assert_eq!(and.next_position().unwrap(), Some(4));
        and.seek(0).unwrap();
        assert_eq!(and.next_position().unwrap(), Some(2));

        let mut or = Or::pair(a.iter_seek(Direction::Forward), b.iter_seek(Direction::Forward)).unwrap();
        assert_eq!(or.next_position().unwrap(), Some(1));
        or.seek(5).unwrap();
        assert_eq!(collect(or), vec![5, 6]);
    }

    #[test]
    fn nested_combinators() {
        let (a, b, c, d) = (
            registry(&set(&[1, 2])),
            registry(&set(&[3, 4])),
            registry(&set(&[2, 3])),
            registry(&set(&[9])),
        );
        let f = Direction::Forward;
        let left = Or::pair(a.iter_seek(f), b.iter_seek(f)).unwrap();
        let right = Or::pair(c.iter_seek(f), d.iter_seek(f)).unwrap();
        assert_eq!(collect(And::pair(left, right).unwrap()), vec![2, 3]);
    }

    fn directions() -> impl Strategy<Value = Direction> {
        prop_oneof![Just(Direction::Forward), Just(Direction::Backward)]
    }

    fn values() -> impl Strategy<Value = BTreeSet<Position>> {
        prop::collection::btree_set(0u64..80, 0..40)
    }

    proptest! {
        #[test]
        fn and_or_match_set_algebra(a in values(), b in values(), direction in directions()) {
            let (ra, rb) = (registry(&a), registry(&b));

            let and = And::pair(ra.iter_seek(direction), rb.iter_seek(direction)).unwrap();
            prop_assert_eq!(collect(and), ordered(a.intersection(&b).copied(), direction));

            let or = Or::pair(ra.iter_seek(direction), rb.iter_seek(direction)).unwrap();
            prop_assert_eq!(collect(or), ordered(a.union(&b).copied(), direction));
        }

        #[test]
        fn composition_associates(
            a in values(), b in values(), c in values(), d in values(),
            direction in directions(),
        ) {
            let (ra, rb, rc, rd) = (registry(&a), registry(&b), registry(&c), registry(&d));
            let left = Or::pair(ra.iter_seek(direction), rb.iter_seek(direction)).unwrap();
            let right = Or::pair(rc.iter_seek(direction), rd.iter_seek(direction)).unwrap();
            let composed = And::pair(left, right).unwrap();

            let ab: BTreeSet<_> = a.union(&b).copied().collect();
            let cd: BTreeSet<_> = c.union(&d).copied().collect();
            prop_assert_eq!(collect(composed), ordered(ab.intersection(&cd).copied(), direction));
        }

        #[test]
        fn seek_yields_suffix(
            a in values(), b in values(), target in 0u64..90,
            direction in directions(),
        ) {
            let (ra, rb) = (registry(&a), registry(&b));
            let in_suffix = |v: &Position| match direction {
                Direction::Forward => *v >= target,
                Direction::Backward => *v <= target,
            };

            let mut and = And::pair(ra.iter_seek(direction), rb.iter_seek(direction)).unwrap();
            and.seek(target).unwrap();
            let expected = ordered(a.intersection(&b).copied().filter(in_suffix), direction);
            prop_assert_eq!(collect(and), expected);

            let mut or = Or::pair(ra.iter_seek(direction), rb.iter_seek(direction)).unwrap();
            or.seek(target).unwrap();
            let expected = ordered(a.union(&b).copied().filter(in_suffix), direction);
            prop_assert_eq!(collect(or), expected);
        }

        #[test]
        fn n_ary_and_or(sets in prop::collection::vec(values(), 1..5), direction in directions()) {
            let registries: Vec<_> = sets.iter().map(registry).collect();

            let sources = registries.iter().map(|r| Box::new(r.iter_seek(direction)) as BoxedSeek<'_>).collect();
            let and = And::new(sources).unwrap();
            let common = sets.iter().skip(1).fold(sets[0].clone(), |acc, s| acc.intersection(s).copied().collect());
            prop_assert_eq!(collect(and), ordered(common, direction));

            let sources = registries.iter().map(|r| Box::new(r.iter_seek(direction)) as BoxedSeek<'_>).collect();
            let or = Or::new(sources).unwrap();
            let all: BTreeSet<_> = sets.iter().flatten().copied().collect();
            prop_assert_eq!(collect(or), ordered(all, direction));
        }
    }
}
