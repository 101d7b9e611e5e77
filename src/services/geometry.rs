//! Planar geometry helpers: centroids, distances and point-in-polygon
//!
//! Containment uses even-odd ray casting with a half-open boundary rule:
//! an edge counts as crossed when the point's y lies in `[min_y, max_y)` of the
//! edge and the point lies strictly left of the crossing. The practical effect
//! is that polygons sharing an edge never both claim a point on it. For an
//! axis-aligned rectangle, points on the left and bottom (min) edges are inside
//! and points on the right and top (max) edges are outside.

use crate::domain::error::CoreError;
use crate::domain::types::{BoundingBox, Point};

/// Minimum number of vertices for a polygon
pub const MIN_POLYGON_VERTICES: usize = 3;

/// Center of a bounding box
#[inline]
pub fn centroid(bbox: &BoundingBox) -> Point {
    Point::new(bbox.x + bbox.width / 2.0, bbox.y + bbox.height / 2.0)
}

/// Euclidean distance
#[inline]
pub fn distance(p1: Point, p2: Point) -> f64 {
    (p1.x - p2.x).hypot(p1.y - p2.y)
}

/// Test whether `point` lies inside the polygon described by `vertices`
///
/// Fails with `InvalidZoneGeometry` when fewer than 3 vertices are given.
pub fn point_in_polygon(point: Point, vertices: &[Point]) -> Result<bool, CoreError> {
    if vertices.len() < MIN_POLYGON_VERTICES {
        return Err(CoreError::geometry(
            None,
            format!("needs at least {MIN_POLYGON_VERTICES} vertices, got {}", vertices.len()),
        ));
    }
    Ok(ray_cast(point, vertices))
}

/// Even-odd crossing test; callers guarantee `vertices.len() >= 3`
pub(crate) fn ray_cast(point: Point, vertices: &[Point]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (vi, vj) = (vertices[i], vertices[j]);
        if (vi.y > point.y) != (vj.y > point.y) {
            let x_cross = (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Axis-aligned bounds of a polygon, used as a cheap pre-filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn of(vertices: &[Point]) -> Self {
        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for v in vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
        }
        Self { min, max }
    }

    /// Closed-interval containment; never rejects a point ray casting would accept
    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}
