//! Robust geometric predicates and fixed-precision scaling.
//!
//! Orientation tests use Shewchuk's adaptive precision arithmetic through the
//! `robust` crate. Boolean polygon operations run on coordinates snapped to an
//! integer grid (see [`ScalingConfig`]) and are scaled back afterwards.
//!
//! ```rust
//! use sheetnest_core::robust::{orient2d, Orientation};
//!
//! assert_eq!(
//!     orient2d((0.0, 0.0), (1.0, 0.0), (0.5, 1.0)),
//!     Orientation::CounterClockwise
//! );
//! ```

use robust::{orient2d as robust_orient2d, Coord};

/// Tolerance for "almost equal" coordinate comparisons.
pub const TOLERANCE: f64 = 1e-9;

/// Result of an orientation test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Points are arranged counter-clockwise (left turn).
    CounterClockwise,
    /// Points are arranged clockwise (right turn).
    Clockwise,
    /// Points are collinear (on the same line).
    Collinear,
}

impl Orientation {
    /// Returns true if the orientation is counter-clockwise.
    #[inline]
    pub fn is_ccw(self) -> bool {
        matches!(self, Orientation::CounterClockwise)
    }

    /// Returns true if the orientation is clockwise.
    #[inline]
    pub fn is_cw(self) -> bool {
        matches!(self, Orientation::Clockwise)
    }

    /// Returns true if the points are collinear.
    #[inline]
    pub fn is_collinear(self) -> bool {
        matches!(self, Orientation::Collinear)
    }
}

/// Location of a point relative to a closed polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLocation {
    Inside,
    Outside,
    /// On an edge or vertex, within [`TOLERANCE`]-scaled distance.
    Boundary,
}

// ============================================================================
// Core Predicates
// ============================================================================

/// Determines the orientation of `pc` relative to the directed line `pa -> pb`.
#[inline]
pub fn orient2d(pa: (f64, f64), pb: (f64, f64), pc: (f64, f64)) -> Orientation {
    let result = robust_orient2d(
        Coord { x: pa.0, y: pa.1 },
        Coord { x: pb.0, y: pb.1 },
        Coord { x: pc.0, y: pc.1 },
    );

    if result > 0.0 {
        Orientation::CounterClockwise
    } else if result < 0.0 {
        Orientation::Clockwise
    } else {
        Orientation::Collinear
    }
}

/// Returns true if two values are within `tolerance` of each other.
#[inline]
pub fn almost_equal(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() < tolerance
}

/// Returns true if two points are within `tolerance` of each other on both axes.
#[inline]
pub fn points_almost_equal(a: (f64, f64), b: (f64, f64), tolerance: f64) -> bool {
    almost_equal(a.0, b.0, tolerance) && almost_equal(a.1, b.1, tolerance)
}

/// Checks if a point lies strictly inside a triangle (vertices in any order).
pub fn point_in_triangle_robust(
    p: (f64, f64),
    a: (f64, f64),
    b: (f64, f64),
    c: (f64, f64),
) -> bool {
    let o1 = orient2d(a, b, p);
    let o2 = orient2d(b, c, p);
    let o3 = orient2d(c, a, p);

    (o1.is_ccw() && o2.is_ccw() && o3.is_ccw()) || (o1.is_cw() && o2.is_cw() && o3.is_cw())
}

/// Checks if a polygon is convex, ignoring collinear vertices.
pub fn is_convex_robust(polygon: &[(f64, f64)]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut expected: Option<Orientation> = None;

    for i in 0..n {
        let o = orient2d(polygon[i], polygon[(i + 1) % n], polygon[(i + 2) % n]);
        if o.is_collinear() {
            continue;
        }
        match expected {
            None => expected = Some(o),
            Some(e) if e != o => return false,
            _ => {}
        }
    }

    true
}

/// Signed area by the shoelace formula with Kahan summation.
/// Positive for counter-clockwise rings.
pub fn signed_area(polygon: &[(f64, f64)]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut c = 0.0;

    for i in 0..n {
        let j = (i + 1) % n;
        let term = polygon[i].0 * polygon[j].1 - polygon[j].0 * polygon[i].1;

        let y = term - c;
        let t = sum + y;
        c = (t - sum) - y;
        sum = t;
    }

    sum / 2.0
}

/// Classifies a point against a closed ring (either winding).
///
/// Points within `tolerance` of an edge are reported as [`PointLocation::Boundary`].
pub fn locate_point(point: (f64, f64), ring: &[(f64, f64)], tolerance: f64) -> PointLocation {
    let n = ring.len();
    if n < 3 {
        return PointLocation::Outside;
    }

    let (px, py) = point;
    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];

        if on_segment(point, (xj, yj), (xi, yi), tolerance) {
            return PointLocation::Boundary;
        }

        if ((yi > py) != (yj > py)) && (px < (xj - xi) * (py - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    if inside {
        PointLocation::Inside
    } else {
        PointLocation::Outside
    }
}

fn on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64), tolerance: f64) -> bool {
    if points_almost_equal(p, a, tolerance) || points_almost_equal(p, b, tolerance) {
        return true;
    }

    let (min_x, max_x) = (a.0.min(b.0), a.0.max(b.0));
    let (min_y, max_y) = (a.1.min(b.1), a.1.max(b.1));
    if p.0 < min_x - tolerance
        || p.0 > max_x + tolerance
        || p.1 < min_y - tolerance
        || p.1 > max_y + tolerance
    {
        return false;
    }

    if orient2d(a, b, p).is_collinear() {
        return true;
    }

    // Distance from p to the line through a, b.
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len < tolerance {
        return false;
    }
    let cross = (p.0 - a.0) * dy - (p.1 - a.1) * dx;
    (cross / len).abs() < tolerance
}

// ============================================================================
// Integer Coordinate Scaling
// ============================================================================

/// Fixed-precision scaling used around boolean polygon operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingConfig {
    /// The scale factor (coordinates are multiplied by this value).
    pub scale: f64,
    /// The inverse scale factor (for converting back).
    pub inv_scale: f64,
}

impl ScalingConfig {
    /// Creates a scaling that preserves `precision` decimal places.
    ///
    /// ```rust
    /// use sheetnest_core::robust::ScalingConfig;
    ///
    /// assert_eq!(ScalingConfig::new(3).scale, 1000.0);
    /// ```
    pub fn new(precision: u32) -> Self {
        Self::with_factor(10.0_f64.powi(precision as i32))
    }

    /// Creates a scaling from an explicit factor. Non-positive factors fall back to 1.
    pub fn with_factor(scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        };
        Self {
            scale,
            inv_scale: 1.0 / scale,
        }
    }

    /// Scales a coordinate onto the integer grid.
    #[inline]
    pub fn scale_coord(&self, x: f64) -> f64 {
        (x * self.scale).round()
    }

    /// Scales a point onto the integer grid.
    #[inline]
    pub fn scale_point(&self, p: (f64, f64)) -> [f64; 2] {
        [self.scale_coord(p.0), self.scale_coord(p.1)]
    }

    /// Unscales a grid point back to model coordinates.
    #[inline]
    pub fn unscale_point(&self, p: [f64; 2]) -> (f64, f64) {
        (p[0] * self.inv_scale, p[1] * self.inv_scale)
    }

    /// Scales an entire ring.
    pub fn scale_ring(&self, ring: &[(f64, f64)]) -> Vec<[f64; 2]> {
        ring.iter().map(|&p| self.scale_point(p)).collect()
    }

    /// Unscales an entire ring.
    pub fn unscale_ring(&self, ring: &[[f64; 2]]) -> Vec<(f64, f64)> {
        ring.iter().map(|&p| self.unscale_point(p)).collect()
    }

    /// Smallest representable distance in model coordinates.
    pub fn resolution(&self) -> f64 {
        self.inv_scale
    }
}

impl Default for ScalingConfig {
    /// Default scaling preserves 7 decimal places.
    fn default() -> Self {
        Self::new(7)
    }
}

// ============================================================================
// Tests
// ============================================================================
