//! No-Fit Polygon (NFP) computation.
//!
//! The outer NFP of a fixed polygon A and a moving polygon B is the set of translations
//! of B's reference point (its origin) at which B overlaps A:
//! `NFP(A, B) = A ⊕ (−B)`.
//!
//! The inner NFP is the set of translations keeping B inside A, touching allowed. It is
//! used for sheets and for the holes of parts:
//! `IFP(A, B) = (A − b0) \ (∂A ⊕ −B)`, where `b0` is any vertex of B and `∂A ⊕ −B` is
//! the band swept by B along A's boundary. Axis-aligned rectangles take a closed-form
//! path.

use crate::clipping::{self, Ring, Shape};
use crate::geometry::{convex_hull, is_convex, Bounds, Polygon};
use crate::minkowski::{self, MinkowskiBackend};
use sheetnest_core::robust::{signed_area, ScalingConfig, TOLERANCE};
use sheetnest_core::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Share of the moving polygon's area allowed outside the container at an inner NFP
/// vertex.
const CONTAINMENT_TOLERANCE: f64 = 1e-6;

/// Computed NFP of a polygon pair.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Nfp {
    /// Loops of the region. Outer loops are counter-clockwise, enclosed loops clockwise,
    /// so the set is read with the non-zero rule.
    pub polygons: Vec<Vec<(f64, f64)>>,

    /// Regions inside the fixed polygon's holes where the moving polygon fits.
    /// Only set on outer NFPs.
    pub holes: Vec<Vec<(f64, f64)>>,
}

impl Nfp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an NFP with a single loop.
    pub fn from_polygon(polygon: Vec<(f64, f64)>) -> Self {
        Self {
            polygons: vec![polygon],
            holes: Vec::new(),
        }
    }

    /// Creates an NFP from boolean operation output.
    pub fn from_shapes(shapes: &[Shape]) -> Self {
        Self {
            polygons: clipping::rings(shapes),
            holes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Total vertex count across all loops.
    pub fn vertex_count(&self) -> usize {
        self.polygons.iter().map(|p| p.len()).sum::<usize>()
            + self.holes.iter().map(|p| p.len()).sum::<usize>()
    }

    /// Net area of the region (hole regions are not subtracted).
    pub fn area(&self) -> f64 {
        self.polygons.iter().map(|p| signed_area(p)).sum()
    }

    /// Bounding box of all loops.
    pub fn bounds(&self) -> Option<Bounds> {
        self.polygons
            .iter()
            .filter_map(|p| Bounds::of(p))
            .reduce(|a, b| a.union(&b))
    }

    /// Copy moved by `(dx, dy)`.
    pub fn translated(&self, dx: f64, dy: f64) -> Nfp {
        let shift = |loops: &[Vec<(f64, f64)>]| -> Vec<Vec<(f64, f64)>> {
            loops
                .iter()
                .map(|l| l.iter().map(|&(x, y)| (x + dx, y + dy)).collect())
                .collect()
        };
        Nfp {
            polygons: shift(&self.polygons),
            holes: shift(&self.holes),
        }
    }
}

/// Which NFP to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NfpMode {
    /// Positions where the moving polygon overlaps the fixed one.
    Outer,
    /// Positions where the moving polygon stays inside the fixed one.
    Inner,
}

/// Geometry engine settings.
#[derive(Debug, Clone, Copy)]
pub struct NfpEngine {
    pub backend: MinkowskiBackend,
    pub scaling: ScalingConfig,
    /// Whether outer NFPs also carry the free regions inside the fixed polygon's holes.
    pub use_holes: bool,
}

impl NfpEngine {
    pub fn new(backend: MinkowskiBackend, scaling: ScalingConfig) -> Self {
        Self {
            backend,
            scaling,
            use_holes: true,
        }
    }

    pub fn with_holes(mut self, use_holes: bool) -> Self {
        self.use_holes = use_holes;
        self
    }

    /// Computes the NFP of `b` (rotated by `rotation_b`) around `a` (rotated by
    /// `rotation_a`). Both polygons are taken unrotated; holes rotate with their parent.
    ///
    /// Deterministic for identical inputs. Fails with `GeometryFailure` when the result
    /// is empty or degenerate.
    pub fn calculate_nfp(
        &self,
        a: &Polygon,
        b: &Polygon,
        rotation_a: f64,
        rotation_b: f64,
        mode: NfpMode,
    ) -> Result<Nfp> {
        let a = a.rotated(rotation_a);
        let b = b.rotated(rotation_b);
        match mode {
            NfpMode::Outer => self.outer_nfp(&a, &b),
            NfpMode::Inner => self.inner_nfp(a.points(), b.points()),
        }
    }

    /// Outer NFP of two polygons already in their final orientation.
    pub fn outer_nfp(&self, a: &Polygon, b: &Polygon) -> Result<Nfp> {
        let reflected = minkowski::reflect(b.points());
        let shapes = self.backend.sum(a.points(), &reflected, &self.scaling)?;
        let mut nfp = Nfp::from_shapes(&shapes);
        if nfp.is_empty() || nfp.area().abs() < TOLERANCE {
            return Err(Error::GeometryFailure(format!(
                "outer NFP of {} and {} is empty",
                a.source, b.source
            )));
        }

        if self.use_holes && a.has_holes() {
            nfp.holes = self.hole_regions(a, b);
        }
        Ok(nfp)
    }

    /// Inner NFPs of `b` inside each hole of `a` wide and tall enough to take it.
    fn hole_regions(&self, a: &Polygon, b: &Polygon) -> Vec<Vec<(f64, f64)>> {
        let Some(b_bounds) = b.bounds() else {
            return Vec::new();
        };
        let mut regions = Vec::new();
        for hole in &a.children {
            let Some(hb) = hole.bounds() else { continue };
            if hb.width() <= b_bounds.width() || hb.height() <= b_bounds.height() {
                continue;
            }
            match self.inner_nfp(hole.points(), b.points()) {
                Ok(inner) => regions.extend(inner.polygons),
                Err(e) => log::debug!("Skipping hole of part {}: {}", a.source, e),
            }
        }
        regions
    }

    /// Inner NFP of `b` inside the ring `a`.
    pub fn inner_nfp(&self, a: &[(f64, f64)], b: &[(f64, f64)]) -> Result<Nfp> {
        let (Some(ab), Some(bb)) = (Bounds::of(a), Bounds::of(b)) else {
            return Err(Error::GeometryFailure("inner NFP of an empty polygon".into()));
        };
        if bb.width() > ab.width() + TOLERANCE || bb.height() > ab.height() + TOLERANCE {
            return Err(Error::GeometryFailure(format!(
                "{:.3}x{:.3} does not fit in {:.3}x{:.3}",
                bb.width(),
                bb.height(),
                ab.width(),
                ab.height()
            )));
        }

        if is_rectangle(a) {
            return Ok(Nfp::from_polygon(rectangle_ifp(&ab, &bb)));
        }

        let b0 = b[0];
        let shifted: Ring = a.iter().map(|&(x, y)| (x - b0.0, y - b0.1)).collect();

        let reflected = minkowski::reflect(b);
        let pieces = minkowski::convex_pieces(&reflected);
        let pieces = &pieces;
        let n = a.len();
        let band: Vec<Ring> = (0..n)
            .flat_map(move |i| {
                let (p, q) = (a[i], a[(i + 1) % n]);
                pieces.iter().map(move |piece| {
                    let swept: Vec<(f64, f64)> = piece
                        .iter()
                        .flat_map(|&(x, y)| [(x + p.0, y + p.1), (x + q.0, y + q.1)])
                        .collect();
                    convex_hull(&swept)
                })
            })
            .filter(|ring| ring.len() >= 3)
            .collect();

        let band = self.backend.union(&band, &self.scaling);
        let free = clipping::difference(&[shifted], &clipping::rings(&band), &self.scaling);

        let free = self.contained_loops(free, a, b);
        if free.is_empty() {
            return Err(Error::GeometryFailure("inner NFP is empty".into()));
        }
        Ok(Nfp::from_shapes(&free))
    }

    /// Drops loops with a vertex at which `b` sticks out of `a`.
    ///
    /// The band difference can leave slivers along container edges that `b` only
    /// touches from the outside.
    fn contained_loops(
        &self,
        loops: Vec<Shape>,
        a: &[(f64, f64)],
        b: &[(f64, f64)],
    ) -> Vec<Shape> {
        let container = [a.to_vec()];
        let allowed = CONTAINMENT_TOLERANCE * signed_area(b).abs().max(1.0)
            + perimeter(b) * self.scaling.resolution();
        loops
            .into_iter()
            .filter(|shape| {
                shape
                    .outer
                    .iter()
                    .all(|&t| self.excess_area(&container, b, t) <= allowed)
            })
            .collect()
    }

    /// Area of `b` translated by `t` that lies outside `container`.
    pub fn excess_area(&self, container: &[Ring], b: &[(f64, f64)], t: (f64, f64)) -> f64 {
        let moved: Ring = b.iter().map(|&(x, y)| (x + t.0, y + t.1)).collect();
        clipping::difference(&[moved], container, &self.scaling)
            .iter()
            .map(Shape::area)
            .sum()
    }
}

fn perimeter(ring: &[(f64, f64)]) -> f64 {
    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(p, q)| (q.0 - p.0).hypot(q.1 - p.1))
        .sum()
}

/// Inner NFP of a box inside an axis-aligned rectangular container. The result may
/// collapse to a segment or a point when the box fits exactly.
fn rectangle_ifp(container: &Bounds, item: &Bounds) -> Vec<(f64, f64)> {
    let min_x = container.min_x - item.min_x;
    let min_y = container.min_y - item.min_y;
    let max_x = container.max_x - item.max_x;
    let max_y = container.max_y - item.max_y;
    vec![(min_x, min_y), (max_x, min_y), (max_x, max_y), (min_x, max_y)]
}

/// Returns true for a convex four-point ring with axis-aligned edges.
pub fn is_rectangle(points: &[(f64, f64)]) -> bool {
    if points.len() != 4 || !is_convex(points) {
        return false;
    }
    (0..4).all(|i| {
        let (p, q) = (points[i], points[(i + 1) % 4]);
        (p.0 - q.0).abs() < TOLERANCE || (p.1 - q.1).abs() < TOLERANCE
    })
}
