use crate::geometry::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Eight-way facing, plus `None` for "not moving".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    None,
    Left,
    Right,
    Up,
    Down,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Direction {
    pub const CARDINAL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Grid vector for this direction. Diagonals are not normalized.
    pub fn to_vec(self) -> Vec2 {
        match self {
            Direction::None => Vec2::ZERO,
            Direction::Left => Vec2::new(-1.0, 0.0),
            Direction::Right => Vec2::new(1.0, 0.0),
            Direction::Up => Vec2::new(0.0, 1.0),
            Direction::Down => Vec2::new(0.0, -1.0),
            Direction::UpLeft => Vec2::new(-1.0, 1.0),
            Direction::UpRight => Vec2::new(1.0, 1.0),
            Direction::DownLeft => Vec2::new(-1.0, -1.0),
            Direction::DownRight => Vec2::new(1.0, -1.0),
        }
    }

    /// Maps a unit vector to the nearest direction by rounding each component
    /// to -1, 0 or 1.
    pub fn from_unit(v: Vec2) -> Direction {
        let x = (v.x + 0.5).floor();
        let y = (v.y + 0.5).floor();
        match (x as i8, y as i8) {
            (-1, 0) => Direction::Left,
            (1, 0) => Direction::Right,
            (0, 1) => Direction::Up,
            (0, -1) => Direction::Down,
            (-1, 1) => Direction::UpLeft,
            (1, 1) => Direction::UpRight,
            (-1, -1) => Direction::DownLeft,
            (1, -1) => Direction::DownRight,
            _ => Direction::None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::None => "none",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::UpLeft => "up-left",
            Direction::UpRight => "up-right",
            Direction::DownLeft => "down-left",
            Direction::DownRight => "down-right",
        };
        f.write_str(name)
    }
}
