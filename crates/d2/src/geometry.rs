//! 2D polygon model: parts with hole trees, sheets, and the arena that owns them.

use geo::{ConvexHull, Coord, LineString, Polygon as GeoPolygon};
use sheetnest_core::geometry::{PolygonId, RotationConstraint, SheetId, Source};
use sheetnest_core::robust::{points_almost_equal, signed_area, TOLERANCE};
use sheetnest_core::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Miter length limit, in multiples of the offset distance.
const MITER_LIMIT: f64 = 4.0;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Bounds of a point set. Returns `None` when `points` is empty.
    pub fn of(points: &[(f64, f64)]) -> Option<Self> {
        let (&(x0, y0), rest) = points.split_first()?;
        let mut b = Bounds {
            min_x: x0,
            min_y: y0,
            max_x: x0,
            max_y: y0,
        };
        for &(x, y) in rest {
            b.include(x, y);
        }
        Some(b)
    }

    /// Grows the box to contain `(x, y)`.
    pub fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Bounds {
        Bounds {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }
}

/// A polygon with an optional tree of holes.
///
/// Children are holes expressed in the parent's coordinate frame; rotating a polygon
/// rotates its whole tree around the same origin.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Polygon {
    /// Instance identifier, unique within a run.
    pub id: PolygonId,

    /// Logical part identifier shared by all instances and rotations.
    pub source: Source,

    /// Outline vertices.
    points: Vec<(f64, f64)>,

    /// Whether the outline is a closed loop.
    pub closed: bool,

    /// Holes, in this polygon's frame.
    pub children: Vec<Polygon>,

    /// Rotation applied to `points`, in degrees.
    pub rotation: f64,

    /// Translation assigned by placement.
    pub x: f64,
    pub y: f64,

    /// Number of instances to nest.
    pub quantity: usize,

    /// Allowed rotations.
    pub rotation_constraint: RotationConstraint,

    /// Sheet this instance was assigned to, looked up by id.
    pub sheet: Option<SheetId>,
}

impl Polygon {
    /// Creates a closed polygon from its outline.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self {
            id: 0,
            source: 0,
            points,
            closed: true,
            children: Vec::new(),
            rotation: 0.0,
            x: 0.0,
            y: 0.0,
            quantity: 1,
            rotation_constraint: RotationConstraint::default(),
            sheet: None,
        }
    }

    /// Creates an axis-aligned rectangle with its corner at the origin.
    pub fn rectangle(width: f64, height: f64) -> Self {
        Self::new(vec![
            (0.0, 0.0),
            (width, 0.0),
            (width, height),
            (0.0, height),
        ])
    }

    /// Creates an L-shaped polygon.
    pub fn l_shape(width: f64, height: f64, notch_width: f64, notch_height: f64) -> Self {
        Self::new(vec![
            (0.0, 0.0),
            (width, 0.0),
            (width, notch_height),
            (notch_width, notch_height),
            (notch_width, height),
            (0.0, height),
        ])
    }

    /// Adds a hole.
    pub fn with_hole(mut self, points: Vec<(f64, f64)>) -> Self {
        self.children.push(Polygon::new(points));
        self
    }

    /// Sets the number of instances.
    pub fn with_quantity(mut self, quantity: usize) -> Self {
        self.quantity = quantity;
        self
    }

    /// Sets the rotation constraint.
    pub fn with_rotation_constraint(mut self, constraint: RotationConstraint) -> Self {
        self.rotation_constraint = constraint;
        self
    }

    /// Marks the outline as an open path. Open paths are rejected by
    /// [`Polygon::validate`].
    pub fn open(mut self) -> Self {
        self.closed = false;
        self
    }

    /// Closes open paths, holes included, whose ends meet within [`TOLERANCE`],
    /// dropping the repeated end point. Paths with distinct ends stay open.
    pub fn close(&mut self) {
        if !self.closed {
            if let (Some(&first), Some(&last)) = (self.points.first(), self.points.last()) {
                if self.points.len() > 3 && points_almost_equal(first, last, TOLERANCE) {
                    self.points.pop();
                    self.closed = true;
                }
            }
        }
        for child in &mut self.children {
            child.close();
        }
    }

    /// Outline vertices.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Returns true if the polygon has holes.
    pub fn has_holes(&self) -> bool {
        !self.children.is_empty()
    }

    /// Net area: outline area minus hole areas.
    pub fn area(&self) -> f64 {
        let holes: f64 = self.children.iter().map(|c| c.area()).sum();
        (signed_area(&self.points).abs() - holes).max(0.0)
    }

    /// Bounding box of the outline (placement not applied).
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::of(&self.points)
    }

    /// Returns true if the outline is convex.
    pub fn is_convex(&self) -> bool {
        is_convex(&self.points)
    }

    /// Convex hull of the outline.
    pub fn convex_hull(&self) -> Vec<(f64, f64)> {
        convex_hull(&self.points)
    }

    /// Converts to a geo crate polygon.
    pub fn to_geo_polygon(&self) -> GeoPolygon<f64> {
        let ring = |pts: &[(f64, f64)]| {
            LineString::from(pts.iter().map(|&(x, y)| Coord { x, y }).collect::<Vec<_>>())
        };
        GeoPolygon::new(
            ring(&self.points),
            self.children.iter().map(|c| ring(&c.points)).collect(),
        )
    }

    /// Copy rotated by `degrees` around the origin; holes rotate with the outline.
    pub fn rotated(&self, degrees: f64) -> Polygon {
        let mut rotated = self.clone();
        rotated.rotate_in_place(degrees);
        rotated
    }

    fn rotate_in_place(&mut self, degrees: f64) {
        self.points = rotate_points(&self.points, degrees);
        self.rotation += degrees;
        for child in &mut self.children {
            child.rotate_in_place(degrees);
        }
    }

    /// Copy with the outline and holes shifted by `(dx, dy)`.
    pub fn shifted(&self, dx: f64, dy: f64) -> Polygon {
        let mut shifted = self.clone();
        shifted.points = translate_points(&self.points, dx, dy);
        shifted.children = self.children.iter().map(|c| c.shifted(dx, dy)).collect();
        shifted
    }

    /// Checks that the outline can take part in nesting.
    pub fn validate(&self) -> Result<()> {
        if !self.closed {
            return Err(Error::InvalidGeometry(format!(
                "polygon {} is an open path",
                self.id
            )));
        }
        if self.points.len() < 3 {
            return Err(Error::InvalidGeometry(format!(
                "polygon {} needs at least 3 points, got {}",
                self.id,
                self.points.len()
            )));
        }
        if self
            .points
            .iter()
            .any(|&(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(Error::InvalidGeometry(format!(
                "polygon {} has non-finite coordinates",
                self.id
            )));
        }
        if signed_area(&self.points).abs() < TOLERANCE {
            return Err(Error::InvalidGeometry(format!(
                "polygon {} has zero area",
                self.id
            )));
        }
        Ok(())
    }

    /// Copy offset outward by `delta` (inward when negative). Holes move the opposite
    /// way; holes that collapse are dropped.
    pub fn offset(&self, delta: f64) -> Result<Polygon> {
        let mut offset = self.clone();
        if delta.abs() < TOLERANCE {
            return Ok(offset);
        }
        offset.points = offset_ring(&self.points, delta).ok_or_else(|| {
            Error::InvalidGeometry(format!(
                "polygon {} collapses when offset by {}",
                self.id, delta
            ))
        })?;
        offset.children = self
            .children
            .iter()
            .filter_map(|c| {
                offset_ring(&c.points, -delta).map(|points| Polygon {
                    points,
                    ..c.clone()
                })
            })
            .collect();
        Ok(offset)
    }
}

/// A stock sheet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sheet {
    /// Sheet instance identifier, unique within a run.
    pub id: SheetId,

    /// Outline; `polygon.source` identifies the sheet kind.
    pub polygon: Polygon,

    /// Material reference.
    pub material: String,

    /// Number of sheets of this kind.
    pub quantity: usize,
}

impl Sheet {
    /// Creates a sheet from an outline.
    pub fn new(polygon: Polygon) -> Self {
        Self {
            id: 0,
            polygon,
            material: String::new(),
            quantity: 1,
        }
    }

    /// Creates a rectangular sheet.
    pub fn rectangle(width: f64, height: f64) -> Self {
        Self::new(Polygon::rectangle(width, height))
    }

    /// Sets the material reference.
    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = material.into();
        self
    }

    /// Sets the number of sheets.
    pub fn with_quantity(mut self, quantity: usize) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn source(&self) -> Source {
        self.polygon.source
    }

    pub fn area(&self) -> f64 {
        self.polygon.area()
    }

    pub fn width(&self) -> f64 {
        self.polygon.bounds().map_or(0.0, |b| b.width())
    }

    pub fn height(&self) -> f64 {
        self.polygon.bounds().map_or(0.0, |b| b.height())
    }

    /// Checks the outline; a sheet must enclose area and carry no holes.
    pub fn validate(&self) -> Result<()> {
        self.polygon
            .validate()
            .map_err(|e| Error::InvalidBoundary(format!("sheet {}: {}", self.id, e)))?;
        if self.polygon.has_holes() {
            return Err(Error::InvalidBoundary(format!(
                "sheet {} must not contain holes",
                self.id
            )));
        }
        Ok(())
    }
}

/// Owner of all part instances of a run, indexed by [`PolygonId`].
///
/// Ids are assigned on insertion and equal the index in the arena.
#[derive(Debug, Clone, Default)]
pub struct PolygonArena {
    polygons: Vec<Polygon>,
}

impl PolygonArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a polygon, assigning its id.
    pub fn insert(&mut self, mut polygon: Polygon) -> PolygonId {
        let id = self.polygons.len();
        polygon.id = id;
        self.polygons.push(polygon);
        id
    }

    pub fn get(&self, id: PolygonId) -> Option<&Polygon> {
        self.polygons.get(id)
    }

    pub fn get_mut(&mut self, id: PolygonId) -> Option<&mut Polygon> {
        self.polygons.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Polygon> {
        self.polygons.iter()
    }

    /// Instances assigned to `sheet`.
    pub fn on_sheet(&self, sheet: SheetId) -> impl Iterator<Item = &Polygon> {
        self.polygons
            .iter()
            .filter(move |p| p.sheet == Some(sheet))
    }

    /// Total net area of all instances.
    pub fn total_area(&self) -> f64 {
        self.polygons.iter().map(|p| p.area()).sum()
    }
}

/// Rotates points around the origin by `degrees`.
pub fn rotate_points(points: &[(f64, f64)], degrees: f64) -> Vec<(f64, f64)> {
    if degrees.abs() < TOLERANCE {
        return points.to_vec();
    }
    let (sin_a, cos_a) = degrees.to_radians().sin_cos();
    points
        .iter()
        .map(|&(x, y)| (x * cos_a - y * sin_a, x * sin_a + y * cos_a))
        .collect()
}

/// Shifts points by `(dx, dy)`.
pub fn translate_points(points: &[(f64, f64)], dx: f64, dy: f64) -> Vec<(f64, f64)> {
    points.iter().map(|&(x, y)| (x + dx, y + dy)).collect()
}

/// Returns the ring with positive signed area.
pub fn ensure_ccw(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    if signed_area(points) < 0.0 {
        points.iter().rev().copied().collect()
    } else {
        points.to_vec()
    }
}

/// Returns the ring with negative signed area.
pub fn ensure_cw(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    if signed_area(points) > 0.0 {
        points.iter().rev().copied().collect()
    } else {
        points.to_vec()
    }
}

/// Returns true if every turn of the ring goes the same way.
pub fn is_convex(points: &[(f64, f64)]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0i32;
    for i in 0..n {
        let p0 = points[i];
        let p1 = points[(i + 1) % n];
        let p2 = points[(i + 2) % n];
        let cross = (p1.0 - p0.0) * (p2.1 - p1.1) - (p1.1 - p0.1) * (p2.0 - p1.0);
        if cross.abs() > 1e-10 {
            let current = if cross > 0.0 { 1 } else { -1 };
            if sign == 0 {
                sign = current;
            } else if sign != current {
                return false;
            }
        }
    }
    true
}

/// Convex hull of a point set, without the closing point.
pub fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let line = LineString::from(
        points
            .iter()
            .map(|&(x, y)| Coord { x, y })
            .collect::<Vec<_>>(),
    );
    let hull = line.convex_hull();
    let mut coords: Vec<(f64, f64)> = hull.exterior().coords().map(|c| (c.x, c.y)).collect();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    coords
}

/// Miter-join offset of a simple ring. Positive `delta` grows the enclosed area.
///
/// Returns `None` when the ring collapses (orientation flips or area vanishes).
pub fn offset_ring(points: &[(f64, f64)], delta: f64) -> Option<Vec<(f64, f64)>> {
    let ring = ensure_ccw(&dedup_ring(points));
    let n = ring.len();
    if n < 3 {
        return None;
    }

    let normal = |a: (f64, f64), b: (f64, f64)| -> Option<(f64, f64)> {
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let len = (dx * dx + dy * dy).sqrt();
        (len > TOLERANCE).then(|| (dy / len, -dx / len))
    };

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let cur = ring[i];
        let next = ring[(i + 1) % n];
        let n1 = normal(prev, cur)?;
        let n2 = normal(cur, next)?;

        let denom = 1.0 + n1.0 * n2.0 + n1.1 * n2.1;
        let (mx, my) = (n1.0 + n2.0, n1.1 + n2.1);
        if denom < 2.0 / (MITER_LIMIT * MITER_LIMIT) {
            // Spike: square off with one point per edge.
            out.push((cur.0 + n1.0 * delta, cur.1 + n1.1 * delta));
            out.push((cur.0 + n2.0 * delta, cur.1 + n2.1 * delta));
        } else {
            out.push((cur.0 + mx * delta / denom, cur.1 + my * delta / denom));
        }
    }

    let area = signed_area(&out);
    if area <= TOLERANCE {
        return None;
    }
    Some(out)
}

/// Drops consecutive duplicate points and a duplicated closing point.
pub fn dedup_ring(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for &p in points {
        if out
            .last()
            .map_or(true, |&q| (p.0 - q.0).abs() > TOLERANCE || (p.1 - q.1).abs() > TOLERANCE)
        {
            out.push(p);
        }
    }
    while out.len() > 1 {
        let (first, last) = (out[0], out[out.len() - 1]);
        if (first.0 - last.0).abs() > TOLERANCE || (first.1 - last.1).abs() > TOLERANCE {
            break;
        }
        out.pop();
    }
    out
}
