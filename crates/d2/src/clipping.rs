//! Boolean polygon operations on the integer grid.
//!
//! Inputs are snapped with [`ScalingConfig`] before they reach `i_overlay` and mapped
//! back afterwards. Rings keep their winding: outer loops are counter-clockwise and hole
//! loops clockwise, so a flat list of rings can be fed back with the non-zero fill rule.

use crate::geometry::{dedup_ring, ensure_ccw, ensure_cw};
use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use sheetnest_core::robust::{locate_point, signed_area, PointLocation, ScalingConfig};

/// A closed loop of points.
pub type Ring = Vec<(f64, f64)>;

/// A filled region: one outer loop with holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    /// Counter-clockwise outer loop.
    pub outer: Ring,
    /// Clockwise hole loops.
    pub holes: Vec<Ring>,
}

impl Shape {
    /// Net area.
    pub fn area(&self) -> f64 {
        signed_area(&self.outer) + self.holes.iter().map(|h| signed_area(h)).sum::<f64>()
    }

    /// Classifies a point against the filled region.
    pub fn locate(&self, point: (f64, f64), tolerance: f64) -> PointLocation {
        match locate_point(point, &self.outer, tolerance) {
            PointLocation::Outside => PointLocation::Outside,
            PointLocation::Boundary => PointLocation::Boundary,
            PointLocation::Inside => {
                for hole in &self.holes {
                    match locate_point(point, hole, tolerance) {
                        PointLocation::Inside => return PointLocation::Outside,
                        PointLocation::Boundary => return PointLocation::Boundary,
                        PointLocation::Outside => {}
                    }
                }
                PointLocation::Inside
            }
        }
    }
}

/// Flattens shapes into winding-preserving rings.
pub fn rings(shapes: &[Shape]) -> Vec<Ring> {
    shapes
        .iter()
        .flat_map(|s| std::iter::once(s.outer.clone()).chain(s.holes.iter().cloned()))
        .collect()
}

/// Classifies a point against a union of shapes.
pub fn locate_in_shapes(shapes: &[Shape], point: (f64, f64), tolerance: f64) -> PointLocation {
    let mut location = PointLocation::Outside;
    for shape in shapes {
        match shape.locate(point, tolerance) {
            PointLocation::Inside => return PointLocation::Inside,
            PointLocation::Boundary => location = PointLocation::Boundary,
            PointLocation::Outside => {}
        }
    }
    location
}

/// Unions rings in a single overlay pass.
pub fn union_all(input: &[Ring], scaling: &ScalingConfig) -> Vec<Shape> {
    let subject = to_grid(input, scaling);
    if subject.is_empty() {
        return Vec::new();
    }
    let clip: Vec<Vec<[f64; 2]>> = Vec::new();
    let shapes = subject.overlay(&clip, OverlayRule::Union, FillRule::NonZero);
    from_grid(shapes, scaling)
}

/// Unions rings one at a time into an accumulated region.
pub fn union_incremental(input: &[Ring], scaling: &ScalingConfig) -> Vec<Shape> {
    let mut grid = to_grid(input, scaling).into_iter();
    let Some(first) = grid.next() else {
        return Vec::new();
    };

    let mut result: Vec<Vec<[f64; 2]>> = vec![first];
    for clip in grid {
        let shapes = result.overlay(&[clip], OverlayRule::Union, FillRule::NonZero);
        let merged: Vec<Vec<[f64; 2]>> = shapes
            .into_iter()
            .flatten()
            .filter(|contour| contour.len() >= 3)
            .collect();
        if !merged.is_empty() {
            result = merged;
        }
    }

    let clip: Vec<Vec<[f64; 2]>> = Vec::new();
    let shapes = result.overlay(&clip, OverlayRule::Union, FillRule::NonZero);
    from_grid(shapes, scaling)
}

/// Region covered by `subject` and not by `clip`.
pub fn difference(subject: &[Ring], clip: &[Ring], scaling: &ScalingConfig) -> Vec<Shape> {
    let subject = to_grid(subject, scaling);
    if subject.is_empty() {
        return Vec::new();
    }
    let clip = to_grid(clip, scaling);
    let shapes = subject.overlay(&clip, OverlayRule::Difference, FillRule::NonZero);
    from_grid(shapes, scaling)
}

fn to_grid(input: &[Ring], scaling: &ScalingConfig) -> Vec<Vec<[f64; 2]>> {
    input
        .iter()
        .map(|ring| {
            let mut grid = scaling.scale_ring(ring);
            grid.dedup();
            if grid.len() > 1 && grid.first() == grid.last() {
                grid.pop();
            }
            grid
        })
        .filter(|ring| ring.len() >= 3)
        .collect()
}

fn from_grid(shapes: Vec<Vec<Vec<[f64; 2]>>>, scaling: &ScalingConfig) -> Vec<Shape> {
    let min_area = scaling.resolution() * scaling.resolution();
    shapes
        .into_iter()
        .filter_map(|shape| {
            let mut contours = shape
                .into_iter()
                .map(|c| dedup_ring(&scaling.unscale_ring(&c)))
                .filter(|c| c.len() >= 3 && signed_area(c).abs() > min_area);
            let outer = ensure_ccw(&contours.next()?);
            let holes = contours.map(|h| ensure_cw(&h)).collect();
            Some(Shape { outer, holes })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x: f64, y: f64, size: f64) -> Ring {
        vec![(x, y), (x + size, y), (x + size, y + size), (x, y + size)]
    }

    fn total_area(shapes: &[Shape]) -> f64 {
        shapes.iter().map(Shape::area).sum()
    }

    #[test]
    fn test_union_overlapping() {
        let scaling = ScalingConfig::default();
        let input = vec![square(0.0, 0.0, 10.0), square(5.0, 0.0, 10.0)];

        let batched = union_all(&input, &scaling);
        let incremental = union_incremental(&input, &scaling);
        assert_eq!(batched.len(), 1);
        assert_relative_eq!(total_area(&batched), 150.0, epsilon = 1e-6);
        assert_relative_eq!(total_area(&incremental), 150.0, epsilon = 1e-6);
    }

    #[test]
    fn test_union_disjoint() {
        let scaling = ScalingConfig::default();
        let shapes = union_all(&[square(0.0, 0.0, 1.0), square(5.0, 5.0, 1.0)], &scaling);
        assert_eq!(shapes.len(), 2);
    }

    #[test]
    fn test_difference_makes_hole() {
        let scaling = ScalingConfig::default();
        let shapes = difference(
            &[square(0.0, 0.0, 10.0)],
            &[square(4.0, 4.0, 2.0)],
            &scaling,
        );
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].holes.len(), 1);
        assert!(signed_area(&shapes[0].outer) > 0.0);
        assert!(signed_area(&shapes[0].holes[0]) < 0.0);
        assert_relative_eq!(shapes[0].area(), 96.0, epsilon = 1e-6);

        assert_eq!(shapes[0].locate((5.0, 5.0), 1e-9), PointLocation::Outside);
        assert_eq!(shapes[0].locate((1.0, 1.0), 1e-9), PointLocation::Inside);
        assert_eq!(shapes[0].locate((4.0, 5.0), 1e-6), PointLocation::Boundary);
    }

    #[test]
    fn test_rings_round_trip_through_nonzero() {
        let scaling = ScalingConfig::default();
        let framed = difference(
            &[square(0.0, 0.0, 10.0)],
            &[square(2.0, 2.0, 6.0)],
            &scaling,
        );
        // Feeding the flattened rings back keeps the hole.
        let again = union_all(&rings(&framed), &scaling);
        assert_relative_eq!(total_area(&again), 64.0, epsilon = 1e-6);
        assert_eq!(
            locate_in_shapes(&again, (5.0, 5.0), 1e-9),
            PointLocation::Outside
        );
    }

    #[test]
    fn test_empty_inputs() {
        let scaling = ScalingConfig::default();
        assert!(union_all(&[], &scaling).is_empty());
        assert!(union_incremental(&[], &scaling).is_empty());
        assert!(difference(&[], &[square(0.0, 0.0, 1.0)], &scaling).is_empty());
        let untouched = difference(&[square(0.0, 0.0, 1.0)], &[], &scaling);
        assert_relative_eq!(total_area(&untouched), 1.0, epsilon = 1e-9);
    }
}
