//! Core type definitions.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Position of an entry in the log.
///
/// Positions are assigned in increasing order at append time and never
/// reused while the entry is live.
pub type Position = u64;

/// Smallest position.
pub const MIN: Position = 0;

/// Largest position.
pub const MAX: Position = u64::MAX;

/// Walk direction of a position stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ascending positions.
    Forward,
    /// Descending positions.
    Backward,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    /// Returns true for [`Direction::Forward`].
    #[must_use]
    pub const fn is_forward(self) -> bool {
        matches!(self, Self::Forward)
    }

    /// Position a fresh walk starts from.
    #[must_use]
    pub const fn start(self) -> Position {
        match self {
            Self::Forward => MIN,
            Self::Backward => MAX,
        }
    }

    /// Position following `position` in this direction, `None` past the domain edge.
    #[must_use]
    pub const fn step(self, position: Position) -> Option<Position> {
        match self {
            Self::Forward => position.checked_add(1),
            Self::Backward => position.checked_sub(1),
        }
    }

    /// Returns whichever of `a` and `b` comes first in this direction.
    #[must_use]
    pub fn first_of(self, a: Position, b: Position) -> Position {
        match self {
            Self::Forward => a.min(b),
            Self::Backward => a.max(b),
        }
    }

    /// Returns true if `a` comes strictly before `b` in this direction.
    #[must_use]
    pub const fn precedes(self, a: Position, b: Position) -> bool {
        match self {
            Self::Forward => a < b,
            Self::Backward => a > b,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
        }
    }
}

/// Encodes a position as an order-preserving table key.
#[must_use]
pub fn position_key(position: Position) -> [u8; 8] {
    position.to_be_bytes()
}

/// Decodes a position stored by [`position_key`].
///
/// # Errors
///
/// Returns [`CoreError::Corruption`] if the bytes are not 8 bytes long.
pub fn decode_position(bytes: &[u8]) -> CoreResult<Position> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| CoreError::corruption(format!("position of {} bytes", bytes.len())))?;
    Ok(Position::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_stops_at_domain_edges() {
        assert_eq!(Direction::Forward.step(5), Some(6));
        assert_eq!(Direction::Forward.step(MAX), None);
        assert_eq!(Direction::Backward.step(5), Some(4));
        assert_eq!(Direction::Backward.step(MIN), None);
    }

    #[test]
    fn ordering_helpers() {
        assert_eq!(Direction::Forward.first_of(3, 7), 3);
        assert_eq!(Direction::Backward.first_of(3, 7), 7);
        assert!(Direction::Forward.precedes(3, 7));
        assert!(Direction::Backward.precedes(7, 3));
        assert_eq!(Direction::Forward.reverse(), Direction::Backward);
        assert_eq!(Direction::Backward.start(), MAX);
    }

    #[test]
    fn position_keys_roundtrip_and_sort() {
        assert_eq!(decode_position(&position_key(42)).unwrap(), 42);
        assert!(position_key(255) < position_key(256));
        assert!(decode_position(&[1, 2, 3]).is_err());
    }
}
