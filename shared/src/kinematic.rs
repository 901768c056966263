//! Constant-acceleration kinematics used by the authoritative simulation.
//!
//! Coordinates are y-up: gravity is negative and a grounded actor rests on
//! the top edge of the geometry below it.

use serde::{Deserialize, Serialize};

/// Acceleration due to gravity before an actor's multiplier is applied.
pub const GRAVITY: f64 = -9.8;

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f64,
    ///Value along the y-axis.
    /// Positive direction is up.
    pub y: f64,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Vector2 { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the distance between two points.
    pub fn distance(&self, other: &Vector2) -> f64 {
        self.sub(other).magnitude()
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f64) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    ///Returns the difference of two vectors.
    pub fn sub(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

/// Displacement after `time` seconds: `d = v₀t + ½at²`.
pub fn displacement(initial_velocity: f64, time: f64, acceleration: f64) -> f64 {
    initial_velocity * time + 0.5 * acceleration * time.powi(2)
}

/// Velocity after `time` seconds: `v = v₀ + at`.
pub fn final_velocity(initial_velocity: f64, time: f64, acceleration: f64) -> f64 {
    initial_velocity + acceleration * time
}
