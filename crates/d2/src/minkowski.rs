//! Minkowski sums of simple polygons.
//!
//! - **Convex case**: edge-vector merge in O(n + m).
//! - **General case**: both operands are split into convex pieces (ear clipping); the
//!   pairwise convex sums are unioned.
//!
//! The union step runs on one of two backends. [`MinkowskiBackend::Accelerated`] sums
//! the piece pairs on the rayon pool and unions them in a single overlay pass; it exists
//! only when the crate is built with the `accelerated` feature.
//! [`MinkowskiBackend::Fallback`] is sequential with incremental unions and is always
//! available. The backend is chosen once, when a nest starts.

use crate::clipping::{self, Ring, Shape};
use crate::geometry::{convex_hull, dedup_ring, ensure_ccw, is_convex};
use sheetnest_core::robust::{point_in_triangle_robust, ScalingConfig};
use sheetnest_core::{Error, MinkowskiPolicy, Result};
use std::f64::consts::PI;

#[cfg(feature = "accelerated")]
use rayon::prelude::*;

/// Implementation of the general-case union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinkowskiBackend {
    /// Parallel piece sums with a batched union.
    Accelerated,
    /// Sequential piece sums with incremental unions.
    Fallback,
}

impl MinkowskiBackend {
    /// Returns true if this build carries the accelerated backend.
    pub fn accelerated_available() -> bool {
        cfg!(feature = "accelerated")
    }

    /// Resolves the backend for `policy` against this build.
    pub fn detect(policy: MinkowskiPolicy) -> Result<Self> {
        Self::select(policy, Self::accelerated_available())
    }

    /// Resolves the backend for `policy` given whether acceleration is available.
    pub fn select(policy: MinkowskiPolicy, accelerated_available: bool) -> Result<Self> {
        match (policy, accelerated_available) {
            (MinkowskiPolicy::FallbackOnly, _) => Ok(Self::Fallback),
            (_, true) => Ok(Self::Accelerated),
            (MinkowskiPolicy::Fallback, false) => {
                log::warn!("Accelerated Minkowski backend unavailable, using the fallback");
                Ok(Self::Fallback)
            }
            (MinkowskiPolicy::FailFast, false) => Err(Error::NativeAccelerationUnavailable(
                "this build does not include the accelerated Minkowski backend".into(),
            )),
        }
    }

    /// Minkowski sum `a ⊕ b` of two simple polygons.
    pub fn sum(
        &self,
        a: &[(f64, f64)],
        b: &[(f64, f64)],
        scaling: &ScalingConfig,
    ) -> Result<Vec<Shape>> {
        let a = dedup_ring(a);
        let b = dedup_ring(b);
        if a.len() < 3 || b.len() < 3 {
            return Err(Error::GeometryFailure(
                "Minkowski operands need at least 3 distinct points".into(),
            ));
        }

        if is_convex(&a) && is_convex(&b) {
            let ring = convex_sum(&a, &b);
            return Ok(vec![Shape {
                outer: ring,
                holes: Vec::new(),
            }]);
        }

        let pieces_a = convex_pieces(&a);
        let pieces_b = convex_pieces(&b);
        let shapes = self.sum_pieces(&pieces_a, &pieces_b, scaling);
        if shapes.is_empty() {
            return Err(Error::GeometryFailure(
                "Minkowski union produced no geometry".into(),
            ));
        }
        Ok(shapes)
    }

    /// Unions rings with this backend's strategy.
    pub fn union(&self, rings: &[Ring], scaling: &ScalingConfig) -> Vec<Shape> {
        match self {
            MinkowskiBackend::Accelerated => clipping::union_all(rings, scaling),
            MinkowskiBackend::Fallback => clipping::union_incremental(rings, scaling),
        }
    }

    /// Unions the pairwise sums of two sets of convex pieces.
    pub fn sum_pieces(
        &self,
        pieces_a: &[Ring],
        pieces_b: &[Ring],
        scaling: &ScalingConfig,
    ) -> Vec<Shape> {
        match self {
            MinkowskiBackend::Accelerated => accelerated_sum(pieces_a, pieces_b, scaling),
            MinkowskiBackend::Fallback => fallback_sum(pieces_a, pieces_b, scaling),
        }
    }
}

#[cfg(feature = "accelerated")]
fn accelerated_sum(pieces_a: &[Ring], pieces_b: &[Ring], scaling: &ScalingConfig) -> Vec<Shape> {
    let partial: Vec<Ring> = pieces_a
        .par_iter()
        .flat_map_iter(|pa| pieces_b.iter().map(move |pb| convex_sum(pa, pb)))
        .filter(|ring| ring.len() >= 3)
        .collect();
    MinkowskiBackend::Accelerated.union(&partial, scaling)
}

#[cfg(not(feature = "accelerated"))]
fn accelerated_sum(pieces_a: &[Ring], pieces_b: &[Ring], scaling: &ScalingConfig) -> Vec<Shape> {
    fallback_sum(pieces_a, pieces_b, scaling)
}

fn fallback_sum(pieces_a: &[Ring], pieces_b: &[Ring], scaling: &ScalingConfig) -> Vec<Shape> {
    let partial: Vec<Ring> = pieces_a
        .iter()
        .flat_map(|pa| pieces_b.iter().map(move |pb| convex_sum(pa, pb)))
        .filter(|ring| ring.len() >= 3)
        .collect();
    MinkowskiBackend::Fallback.union(&partial, scaling)
}

/// Point reflection through the origin.
pub fn reflect(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    points.iter().map(|&(x, y)| (-x, -y)).collect()
}

/// Minkowski sum of two convex polygons by merging edge vectors sorted by angle.
pub fn convex_sum(poly_a: &[(f64, f64)], poly_b: &[(f64, f64)]) -> Ring {
    let a = ensure_ccw(poly_a);
    let b = ensure_ccw(poly_b);
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }

    let edges_a = edge_vectors(&a);
    let edges_b = edge_vectors(&b);
    let start_a = bottom_left_vertex(&a);
    let start_b = bottom_left_vertex(&b);

    let mut current = (a[start_a].0 + b[start_b].0, a[start_a].1 + b[start_b].1);
    let mut result = Vec::with_capacity(edges_a.len() + edges_b.len() + 1);
    result.push(current);
    for (dx, dy) in merge_edge_vectors(&edges_a, start_a, &edges_b, start_b) {
        current = (current.0 + dx, current.1 + dy);
        result.push(current);
    }

    dedup_ring(&result)
}

fn edge_vectors(polygon: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            (polygon[j].0 - polygon[i].0, polygon[j].1 - polygon[i].1)
        })
        .collect()
}

/// Index of the lowest vertex, leftmost among ties.
fn bottom_left_vertex(polygon: &[(f64, f64)]) -> usize {
    let mut min_idx = 0;
    for (i, &(x, y)) in polygon.iter().enumerate() {
        let (min_x, min_y) = polygon[min_idx];
        if y < min_y || (y == min_y && x < min_x) {
            min_idx = i;
        }
    }
    min_idx
}

/// Angle of an edge vector in `[0, 2π)`.
fn edge_angle(dx: f64, dy: f64) -> f64 {
    let angle = dy.atan2(dx);
    if angle < 0.0 {
        angle + 2.0 * PI
    } else {
        angle
    }
}

fn merge_edge_vectors(
    edges_a: &[(f64, f64)],
    start_a: usize,
    edges_b: &[(f64, f64)],
    start_b: usize,
) -> Vec<(f64, f64)> {
    let (n_a, n_b) = (edges_a.len(), edges_b.len());
    let mut result = Vec::with_capacity(n_a + n_b);
    let (mut i_a, mut i_b) = (0, 0);

    while i_a < n_a || i_b < n_b {
        if i_a >= n_a {
            result.push(edges_b[(start_b + i_b) % n_b]);
            i_b += 1;
        } else if i_b >= n_b {
            result.push(edges_a[(start_a + i_a) % n_a]);
            i_a += 1;
        } else {
            let ea = edges_a[(start_a + i_a) % n_a];
            let eb = edges_b[(start_b + i_b) % n_b];
            let angle_a = edge_angle(ea.0, ea.1);
            let angle_b = edge_angle(eb.0, eb.1);

            if (angle_a - angle_b).abs() <= 1e-10 {
                // Parallel edges fuse into one.
                result.push((ea.0 + eb.0, ea.1 + eb.1));
                i_a += 1;
                i_b += 1;
            } else if angle_a < angle_b {
                result.push(ea);
                i_a += 1;
            } else {
                result.push(eb);
                i_b += 1;
            }
        }
    }
    result
}

/// Splits a simple polygon into convex pieces. Convex input is returned as is.
pub fn convex_pieces(polygon: &[(f64, f64)]) -> Vec<Ring> {
    if polygon.len() < 3 {
        return Vec::new();
    }
    if is_convex(polygon) {
        return vec![ensure_ccw(polygon)];
    }
    triangulate(polygon)
}

/// Ear-clipping triangulation. Falls back to the convex hull when no ear can be found
/// (self-intersecting or degenerate input).
pub fn triangulate(polygon: &[(f64, f64)]) -> Vec<Ring> {
    let mut vertices = ensure_ccw(&dedup_ring(polygon));
    if vertices.len() < 3 {
        return Vec::new();
    }

    let mut triangles = Vec::with_capacity(vertices.len() - 2);
    while vertices.len() > 3 {
        let n = vertices.len();
        let ear = (0..n).find(|&i| is_ear(&vertices, (i + n - 1) % n, i, (i + 1) % n));
        match ear {
            Some(i) => {
                let prev = (i + n - 1) % n;
                let next = (i + 1) % n;
                let (a, b, c) = (vertices[prev], vertices[i], vertices[next]);
                let cross = (b.0 - a.0) * (c.1 - b.1) - (b.1 - a.1) * (c.0 - b.0);
                if cross.abs() > 1e-12 {
                    triangles.push(vec![a, b, c]);
                }
                vertices.remove(i);
            }
            None => {
                log::debug!("Ear clipping stalled, using the convex hull");
                return vec![convex_hull(polygon)];
            }
        }
    }
    triangles.push(vertices);
    triangles
}

fn is_ear(vertices: &[(f64, f64)], prev: usize, curr: usize, next: usize) -> bool {
    let (a, b, c) = (vertices[prev], vertices[curr], vertices[next]);
    let cross = (b.0 - a.0) * (c.1 - b.1) - (b.1 - a.1) * (c.0 - b.0);
    if cross < 0.0 {
        return false;
    }
    if cross == 0.0 {
        // Collinear vertex: clipping it removes nothing.
        return true;
    }
    vertices.iter().enumerate().all(|(i, &p)| {
        i == prev
            || i == curr
            || i == next
            || p == a
            || p == b
            || p == c
            || !point_in_triangle_robust(p, a, b, c)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;
    use approx::assert_relative_eq;
    use sheetnest_core::robust::signed_area;

    fn area(shapes: &[Shape]) -> f64 {
        shapes.iter().map(Shape::area).sum()
    }

    #[test]
    fn test_convex_sum_of_squares() {
        let a = Polygon::rectangle(10.0, 10.0);
        let b = Polygon::rectangle(5.0, 5.0);
        let sum = convex_sum(a.points(), b.points());
        assert_eq!(sum.len(), 4);
        assert_relative_eq!(signed_area(&sum), 225.0, epsilon = 1e-9);
    }

    #[test]
    fn test_triangulate_l_shape() {
        let l = Polygon::l_shape(20.0, 20.0, 10.0, 10.0);
        let triangles = triangulate(l.points());
        assert_eq!(triangles.len(), 4);
        let total: f64 = triangles.iter().map(|t| signed_area(t)).sum();
        assert_relative_eq!(total, l.area(), epsilon = 1e-9);
    }

    #[test]
    fn test_backend_selection() {
        assert_eq!(
            MinkowskiBackend::select(MinkowskiPolicy::Fallback, false).unwrap(),
            MinkowskiBackend::Fallback
        );
        assert_eq!(
            MinkowskiBackend::select(MinkowskiPolicy::Fallback, true).unwrap(),
            MinkowskiBackend::Accelerated
        );
        assert_eq!(
            MinkowskiBackend::select(MinkowskiPolicy::FallbackOnly, true).unwrap(),
            MinkowskiBackend::Fallback
        );
        assert!(matches!(
            MinkowskiBackend::select(MinkowskiPolicy::FailFast, false),
            Err(Error::NativeAccelerationUnavailable(_))
        ));
    }

    #[test]
    fn test_general_sum_backends_agree() {
        let scaling = ScalingConfig::default();
        let l = Polygon::l_shape(20.0, 20.0, 10.0, 10.0);
        let square = reflect(Polygon::rectangle(5.0, 5.0).points());

        let fast = MinkowskiBackend::Accelerated
            .sum(l.points(), &square, &scaling)
            .unwrap();
        let slow = MinkowskiBackend::Fallback
            .sum(l.points(), &square, &scaling)
            .unwrap();

        // L(20, notch 10) grown by a 5x5 square: 25*25 minus the 10x10 notch corner.
        assert_relative_eq!(area(&fast), 525.0, epsilon = 1e-4);
        assert_relative_eq!(area(&slow), area(&fast), epsilon = 1e-4);
    }

    #[test]
    fn test_degenerate_operand() {
        let scaling = ScalingConfig::default();
        let result = MinkowskiBackend::Fallback.sum(
            &[(0.0, 0.0), (1.0, 0.0)],
            Polygon::rectangle(1.0, 1.0).points(),
            &scaling,
        );
        assert!(matches!(result, Err(Error::GeometryFailure(_))));
    }
}
