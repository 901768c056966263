//! Axis-aligned level geometry and the sweep/ray queries the simulation
//! runs against it.

use crate::kinematic::Vector2;
use serde::{Deserialize, Serialize};

/// Tolerance for treating two edges as touching.
const EPSILON: f64 = 1e-6;
/// How far below an actor to look for something to stand on.
const GROUND_PROBE: f64 = 1e-3;

pub const LEVEL_WIDTH: f64 = 1280.0;
pub const LEVEL_HEIGHT: f64 = 720.0;
pub const LEVEL_TILE: f64 = 16.0;

/// Axis-aligned rectangle anchored at its bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle of the given size whose bottom-left corner is `position`.
    pub fn at(position: Vector2, width: f64, height: f64) -> Self {
        Rect::new(position.x, position.y, width, height)
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Vector2 {
        Vector2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// True when the interiors overlap; touching edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right() <= other.left()
            || other.right() <= self.left()
            || self.top() <= other.bottom()
            || other.top() <= self.bottom())
    }

    fn overlaps_vertically(&self, other: &Rect) -> bool {
        self.top() > other.bottom() + EPSILON && self.bottom() < other.top() - EPSILON
    }

    fn overlaps_horizontally(&self, other: &Rect) -> bool {
        self.right() > other.left() + EPSILON && self.left() < other.right() - EPSILON
    }

    /// Liang-Barsky clip of the segment against this rectangle. Segments
    /// that only graze an edge or corner are not considered intersecting.
    pub fn intersects_segment(&self, from: Vector2, to: Vector2) -> bool {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let mut t_enter: f64 = 0.0;
        let mut t_exit: f64 = 1.0;

        let edges = [
            (-dx, from.x - self.left()),
            (dx, self.right() - from.x),
            (-dy, from.y - self.bottom()),
            (dy, self.top() - from.y),
        ];

        for (p, q) in edges {
            if p == 0.0 {
                if q <= 0.0 {
                    return false;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                t_enter = t_enter.max(r);
            } else {
                t_exit = t_exit.min(r);
            }
            if t_enter > t_exit {
                return false;
            }
        }

        t_enter < t_exit
    }
}

/// Static level geometry.
#[derive(Debug, Clone, Default)]
pub struct Space {
    solids: Vec<Rect>,
}

impl Space {
    /// A space with no geometry at all.
    pub fn empty() -> Self {
        Space { solids: Vec::new() }
    }

    /// The arena: floor, ceiling, side walls and two floating platforms.
    pub fn default_level() -> Self {
        let mut space = Space::empty();
        space.add(Rect::new(0.0, 0.0, LEVEL_WIDTH, LEVEL_TILE));
        space.add(Rect::new(0.0, LEVEL_HEIGHT - LEVEL_TILE, LEVEL_WIDTH, LEVEL_TILE));
        space.add(Rect::new(0.0, LEVEL_TILE, LEVEL_TILE, LEVEL_HEIGHT - 2.0 * LEVEL_TILE));
        space.add(Rect::new(
            LEVEL_WIDTH - LEVEL_TILE,
            LEVEL_TILE,
            LEVEL_TILE,
            LEVEL_HEIGHT - 2.0 * LEVEL_TILE,
        ));
        space.add(Rect::new(320.0, 160.0, 192.0, LEVEL_TILE));
        space.add(Rect::new(768.0, 160.0, 192.0, LEVEL_TILE));
        space
    }

    pub fn add(&mut self, solid: Rect) {
        self.solids.push(solid);
    }

    pub fn solids(&self) -> &[Rect] {
        &self.solids
    }

    /// Sweeps `shape` horizontally by `dx`. Returns the displacement that
    /// brings the shape into contact with the nearest solid in its path, or
    /// `None` if the full move is free.
    pub fn sweep_x(&self, shape: &Rect, dx: f64) -> Option<f64> {
        if dx == 0.0 {
            return None;
        }

        let mut contact: Option<f64> = None;
        for solid in &self.solids {
            if !shape.overlaps_vertically(solid) {
                continue;
            }
            let allowed = if dx > 0.0 {
                if solid.left() < shape.right() - EPSILON {
                    continue;
                }
                solid.left() - shape.right()
            } else {
                if solid.right() > shape.left() + EPSILON {
                    continue;
                }
                solid.right() - shape.left()
            };
            if allowed.abs() <= dx.abs() {
                contact = Some(match contact {
                    Some(current) if current.abs() <= allowed.abs() => current,
                    _ => allowed,
                });
            }
        }
        contact
    }

    /// Vertical counterpart of [`Space::sweep_x`].
    pub fn sweep_y(&self, shape: &Rect, dy: f64) -> Option<f64> {
        if dy == 0.0 {
            return None;
        }

        let mut contact: Option<f64> = None;
        for solid in &self.solids {
            if !shape.overlaps_horizontally(solid) {
                continue;
            }
            let allowed = if dy > 0.0 {
                if solid.bottom() < shape.top() - EPSILON {
                    continue;
                }
                solid.bottom() - shape.top()
            } else {
                if solid.top() > shape.bottom() + EPSILON {
                    continue;
                }
                solid.top() - shape.bottom()
            };
            if allowed.abs() <= dy.abs() {
                contact = Some(match contact {
                    Some(current) if current.abs() <= allowed.abs() => current,
                    _ => allowed,
                });
            }
        }
        contact
    }

    /// True if `shape` rests on top of some solid.
    pub fn is_supported(&self, shape: &Rect) -> bool {
        self.sweep_y(shape, -GROUND_PROBE).is_some()
    }

    /// True if no solid blocks the straight line between the two points.
    pub fn line_of_sight(&self, from: Vector2, to: Vector2) -> bool {
        !self
            .solids
            .iter()
            .any(|solid| solid.intersects_segment(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn floor() -> Space {
        let mut space = Space::empty();
        space.add(Rect::new(0.0, 0.0, 1000.0, 16.0));
        space
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(5.0, 5.0, 10.0, 10.0)));
        assert!(!a.intersects(&Rect::new(10.0, 0.0, 10.0, 10.0)));
        assert!(!a.intersects(&Rect::new(50.0, 50.0, 1.0, 1.0)));
    }

    #[test]
    fn test_sweep_y_lands_on_floor() {
        let space = floor();
        let shape = Rect::new(100.0, 20.0, 64.0, 64.0);
        let contact = space.sweep_y(&shape, -10.0).expect("expected contact");
        assert_approx_eq!(contact, -4.0);
    }

    #[test]
    fn test_sweep_y_free_fall() {
        let space = floor();
        let shape = Rect::new(100.0, 200.0, 64.0, 64.0);
        assert_eq!(space.sweep_y(&shape, -10.0), None);
        assert_eq!(space.sweep_y(&shape, 0.0), None);
    }

    #[test]
    fn test_sweep_y_resting_contact() {
        let space = floor();
        let shape = Rect::new(100.0, 16.0, 64.0, 64.0);
        assert_eq!(space.sweep_y(&shape, -1.0), Some(0.0));
        assert_eq!(space.sweep_y(&shape, 5.0), None);
        assert!(space.is_supported(&shape));
        assert!(!space.is_supported(&Rect::new(100.0, 17.0, 64.0, 64.0)));
        assert!(!space.is_supported(&Rect::new(1100.0, 16.0, 64.0, 64.0)));
    }

    #[test]
    fn test_sweep_x_hits_wall() {
        let mut space = Space::empty();
        space.add(Rect::new(200.0, 0.0, 16.0, 300.0));
        let shape = Rect::new(100.0, 50.0, 64.0, 64.0);
        assert_approx_eq!(space.sweep_x(&shape, 50.0).unwrap(), 36.0);
        assert_eq!(space.sweep_x(&shape, -50.0), None);
        assert_eq!(space.sweep_x(&shape, 30.0), None);
    }

    #[test]
    fn test_sweep_x_picks_nearest_solid() {
        let mut space = Space::empty();
        space.add(Rect::new(300.0, 0.0, 16.0, 300.0));
        space.add(Rect::new(200.0, 0.0, 16.0, 300.0));
        let shape = Rect::new(100.0, 50.0, 64.0, 64.0);
        assert_approx_eq!(space.sweep_x(&shape, 500.0).unwrap(), 36.0);
    }

    #[test]
    fn test_sweep_x_ignores_floor_below() {
        let space = floor();
        let shape = Rect::new(100.0, 16.0, 64.0, 64.0);
        assert_eq!(space.sweep_x(&shape, 100.0), None);
    }

    #[test]
    fn test_line_of_sight() {
        let mut space = floor();
        let a = Vector2::new(100.0, 48.0);
        let b = Vector2::new(400.0, 48.0);
        assert!(space.line_of_sight(a, b));

        space.add(Rect::new(250.0, 16.0, 16.0, 100.0));
        assert!(!space.line_of_sight(a, b));
        assert!(!space.line_of_sight(b, a));
    }

    #[test]
    fn test_grazing_ray_is_not_blocked() {
        let space = floor();
        let a = Vector2::new(0.0, 16.0);
        let b = Vector2::new(500.0, 16.0);
        assert!(space.line_of_sight(a, b));
    }

    #[test]
    fn test_default_level_contains_spawn() {
        let space = Space::default_level();
        let spawn = Rect::new(
            crate::PLAYER_STARTING_X,
            crate::PLAYER_STARTING_Y,
            crate::PLAYER_WIDTH,
            crate::PLAYER_HEIGHT,
        );
        assert!(space.solids().iter().all(|solid| !solid.intersects(&spawn)));
    }
}
