use rand::{rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

/// The four movement actions, in the fixed index order used by the
/// action-value tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    /// All directions in table index order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    /// Index of this direction in an action-value row.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        }
    }

    /// Direction for a table index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= 4`; action indices outside the table are a
    /// programmer error.
    pub fn from_index(index: usize) -> Direction {
        Direction::ALL
            .get(index)
            .copied()
            .unwrap_or_else(|| panic!("Action index {index} out of range (0..4)"))
    }

    /// Single-character label used when composing perception hashes.
    pub fn label(self) -> char {
        match self {
            Direction::Up => 'U',
            Direction::Right => 'R',
            Direction::Down => 'D',
            Direction::Left => 'L',
        }
    }
}

/// Policy for breaking ties when several directions reduce the distance to a
/// sighted target equally well.
///
/// The randomized mode reproduces the historical behavior: identical
/// geometric configurations can hash differently across calls, inflating the
/// effective state space. The deterministic mode pins perception down for
/// tests and experiments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Uniformly random among the candidates.
    #[default]
    Random,
    /// Always the first candidate (horizontal before vertical).
    Deterministic,
}

/// A 2D grid coordinate. Value type; all operations produce new positions.
///
/// Coordinates are signed so a step off the `[0,width) x [0,height)` board
/// can be represented and then rejected by the world's move resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }

    /// The position one cell over in `direction`. `Up` decreases `y`
    /// (screen-style coordinates, origin top-left).
    pub fn step(self, direction: Direction) -> Position {
        match direction {
            Direction::Up => Position::new(self.x, self.y - 1),
            Direction::Right => Position::new(self.x + 1, self.y),
            Direction::Down => Position::new(self.x, self.y + 1),
            Direction::Left => Position::new(self.x - 1, self.y),
        }
    }

    /// Manhattan distance to `other`.
    pub fn distance(self, other: Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Direction towards `other`, limited to a sight range of `max_sight`.
    ///
    /// Returns `None` when `other` is this position or lies beyond
    /// `max_sight`. Otherwise collects the axis-aligned candidates that
    /// reduce the distance (at most one horizontal plus one vertical) and
    /// picks one according to `tie_break`.
    pub fn direction_to(
        self,
        other: Position,
        max_sight: u32,
        tie_break: TieBreak,
        rng: &mut StdRng,
    ) -> Option<Direction> {
        if self == other || self.distance(other) > max_sight {
            return None;
        }
        let mut candidates: Vec<Direction> = Vec::with_capacity(2);
        if self.x < other.x {
            candidates.push(Direction::Right);
        } else if self.x > other.x {
            candidates.push(Direction::Left);
        }
        if self.y < other.y {
            candidates.push(Direction::Down);
        } else if self.y > other.y {
            candidates.push(Direction::Up);
        }
        match tie_break {
            TieBreak::Random => candidates.choose(rng).copied(),
            TieBreak::Deterministic => candidates.first().copied(),
        }
    }

    /// Injective string encoding of the coordinates, used as the base of
    /// every perception hash.
    pub fn hash(self) -> String {
        format!("{}:{}", self.x, self.y)
    }
}
