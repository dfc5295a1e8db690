use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f64,
    ///Value along the y-axis.
    /// Positive direction is up.
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector, or the zero vector for a zero input.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f64) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn distance(&self, other: &Vec2) -> f64 {
        (*other - *self).magnitude()
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Rect {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Strict overlap test. Rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.max.x <= other.min.x
            || other.max.x <= self.min.x
            || self.max.y <= other.min.y
            || other.max.y <= self.min.y)
    }
}

/// Rounds `val` to `places` decimal places, halves away from zero.
pub fn round_to(val: f64, places: i32) -> f64 {
    let pow = 10f64.powi(places);
    (val * pow).round() / pow
}

/// Rounds both components of `v` to `places` decimal places.
pub fn round_vec(v: Vec2, places: i32) -> Vec2 {
    Vec2::new(round_to(v.x, places), round_to(v.y, places))
}

/// Clamps `v` into `[min, max]`.
pub fn clamp(v: f64, min: f64, max: f64) -> f64 {
    v.max(min).min(max)
}

/// Whether the distance between `v1` and `v2` is at most `r`.
pub fn within_range(v1: Vec2, v2: Vec2, r: f64) -> bool {
    v1.distance(&v2) <= r
}

/// Uniformly random vector with both components in `[min, max)`.
pub fn random_vec<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> Vec2 {
    if max <= min {
        return Vec2::new(min, min);
    }
    Vec2::new(rng.gen_range(min..max), rng.gen_range(min..max))
}
