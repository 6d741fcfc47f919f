//! Sequential NFP-guided placement.
//!
//! Parts are taken in chromosome order and placed one at a time. For each part the
//! free region of a sheet is
//!
//! ```text
//! F = IFP(sheet, part) \ ⋃ (NFP(placed, part) \ holes(placed, part)) + position(placed)
//! ```
//!
//! and the part goes to the vertex of `F` with the best heuristic score. Parts that
//! do not fit on a sheet move on to the next one; parts that fit nowhere are reported
//! as unplaced.

use crate::cache::{CachedNfp, NfpCache, NfpKey};
use crate::clipping::{self, Ring};
use crate::geometry::{Bounds, Sheet};
use crate::nfp::{NfpEngine, NfpMode};
use crate::pairs::OrderedPart;
use sheetnest_core::robust::{PointLocation, TOLERANCE};
use sheetnest_core::{
    Config, NestResult, PartPlacement, PlacementType, Result, SheetPlacement, UnplacedPart,
};
use std::cmp::Ordering;
use std::time::Instant;

/// Fitness added per unplaced part, scaled by its share of the total sheet area.
const UNPLACED_PENALTY: f64 = 100_000_000.0;

/// Relative slack below which two anchor scores count as equal.
const SCORE_EPSILON: f64 = 1e-9;

/// A part placed on the sheet currently being filled.
#[derive(Debug, Clone, Copy)]
struct Placed<'a> {
    part: OrderedPart<'a>,
    x: f64,
    y: f64,
}

/// Per-part data computed once per evaluation.
#[derive(Debug, Clone, Copy)]
struct Prepared<'a> {
    part: OrderedPart<'a>,
    bounds: Bounds,
    area: f64,
}

/// Places parts on sheets using cached NFPs.
#[derive(Debug, Clone, Copy)]
pub struct PlacementWorker<'a> {
    engine: &'a NfpEngine,
    cache: &'a NfpCache,
    config: &'a Config,
}

impl<'a> PlacementWorker<'a> {
    pub fn new(engine: &'a NfpEngine, cache: &'a NfpCache, config: &'a Config) -> Self {
        Self {
            engine,
            cache,
            config,
        }
    }

    /// Places `parts` in order on `sheets`, filling sheets one after another.
    ///
    /// NFPs missing from the cache are computed on demand. A part that fits on no
    /// sheet is recorded as unplaced; only fatal errors are returned.
    pub fn place_parts(&self, parts: &[OrderedPart<'_>], sheets: &[Sheet]) -> Result<NestResult> {
        let start = Instant::now();
        let total_sheet_area: f64 = sheets.iter().map(Sheet::area).sum();

        let prepared: Vec<Prepared> = parts
            .iter()
            .map(|&part| Prepared {
                part,
                bounds: part
                    .polygon
                    .rotated(part.rotation)
                    .bounds()
                    .unwrap_or_default(),
                area: part.polygon.area(),
            })
            .collect();

        let mut result = NestResult::new();
        let mut fitness = 0.0;
        let mut order = 0;
        let mut remaining: Vec<usize> = (0..prepared.len()).collect();

        for sheet in sheets {
            if remaining.is_empty() {
                break;
            }

            let mut sheet_placement = SheetPlacement::new(sheet.id, sheet.source(), sheet.area());
            let mut placed: Vec<Placed> = Vec::new();
            let mut occupied: Option<Bounds> = None;
            let mut skipped = Vec::new();

            for &index in &remaining {
                let item = &prepared[index];
                let Some((x, y)) = self.place_one(sheet, item, &placed, occupied.as_ref())? else {
                    skipped.push(index);
                    continue;
                };

                let footprint = item.bounds.translated(x, y);
                occupied = Some(occupied.map_or(footprint, |b| b.union(&footprint)));
                placed.push(Placed {
                    part: item.part,
                    x,
                    y,
                });
                sheet_placement.placed_area += item.area;
                sheet_placement.placements.push(PartPlacement {
                    id: item.part.polygon.id,
                    source: item.part.polygon.source,
                    x,
                    y,
                    rotation: item.part.rotation,
                    order,
                });
                order += 1;
            }
            remaining = skipped;

            let Some(occupied) = occupied else {
                continue;
            };
            fitness += sheet.area() + self.sheet_metric(sheet, &occupied);
            result.sheets.push(sheet_placement);
        }

        for &index in &remaining {
            let item = &prepared[index];
            if total_sheet_area > 0.0 {
                fitness += UNPLACED_PENALTY * item.area / total_sheet_area;
            } else {
                fitness += UNPLACED_PENALTY;
            }
            result.unplaced.push(UnplacedPart {
                id: item.part.polygon.id,
                source: item.part.polygon.source,
            });
        }

        let used_area: f64 = result.sheets.iter().map(|s| s.sheet_area).sum();
        let placed_area: f64 = result.sheets.iter().map(|s| s.placed_area).sum();
        result.utilization = if used_area > 0.0 {
            placed_area / used_area
        } else {
            0.0
        };
        result.fitness = fitness;
        result.placement_time_ms = start.elapsed().as_millis() as u64;
        result.valid = result.is_consistent();
        if !result.valid {
            log::warn!("Placement produced an inconsistent layout");
        }

        log::debug!(
            "Placed {}/{} parts on {} sheets, fitness {:.4}",
            result.total_placed_count(),
            parts.len(),
            result.used_sheet_count(),
            result.fitness
        );
        Ok(result)
    }

    /// Finds the anchor of one part on a sheet, or `None` when it does not fit.
    fn place_one(
        &self,
        sheet: &Sheet,
        item: &Prepared<'_>,
        placed: &[Placed<'_>],
        occupied: Option<&Bounds>,
    ) -> Result<Option<(f64, f64)>> {
        let Some(ifp) = self.sheet_nfp(sheet, item.part)? else {
            return Ok(None);
        };

        if placed.is_empty() {
            let first = ifp
                .polygons
                .iter()
                .flatten()
                .copied()
                .min_by(|a, b| scan_order(*a, *b));
            return Ok(first);
        }

        let mut forbidden: Vec<Ring> = Vec::new();
        for p in placed {
            let Some(nfp) = self.pair_nfp(p.part, item.part)? else {
                log::debug!(
                    "No NFP between parts {} and {}, skipping sheet {}",
                    p.part.polygon.source,
                    item.part.polygon.source,
                    sheet.id
                );
                return Ok(None);
            };
            let moved = nfp.translated(p.x, p.y);
            forbidden.extend(moved.polygons);
            // Hole regions are free space inside the placed part.
            forbidden.extend(moved.holes.into_iter().map(|mut hole| {
                hole.reverse();
                hole
            }));
        }

        let scaling = &self.engine.scaling;
        let candidates: Vec<(f64, f64)> = if ifp.area().abs() <= TOLERANCE {
            // Exact fit: the IFP is a segment or a point and has no interior to clip.
            let blocked = clipping::union_all(&forbidden, scaling);
            ifp.polygons
                .iter()
                .flatten()
                .copied()
                .filter(|&pt| {
                    clipping::locate_in_shapes(&blocked, pt, scaling.resolution())
                        != PointLocation::Inside
                })
                .collect()
        } else {
            clipping::difference(&ifp.polygons, &forbidden, scaling)
                .iter()
                .flat_map(|s| s.outer.iter().chain(s.holes.iter().flatten()))
                .copied()
                .collect()
        };

        Ok(self.select(candidates, item, occupied))
    }

    /// Picks the best-scoring candidate. Candidates are scanned left to right, then
    /// bottom to top, and a later one wins only when strictly better.
    fn select(
        &self,
        mut candidates: Vec<(f64, f64)>,
        item: &Prepared<'_>,
        occupied: Option<&Bounds>,
    ) -> Option<(f64, f64)> {
        candidates.sort_by(|a, b| scan_order(*a, *b));
        candidates.dedup();

        let mut best: Option<((f64, f64), f64)> = None;
        for candidate in candidates {
            let score = self.score(candidate, item, occupied);
            let better = match best {
                None => true,
                Some((_, best_score)) => {
                    score < best_score - SCORE_EPSILON * best_score.abs().max(1.0)
                }
            };
            if better {
                best = Some((candidate, score));
            }
        }
        best.map(|(position, _)| position)
    }

    fn score(&self, (x, y): (f64, f64), item: &Prepared<'_>, occupied: Option<&Bounds>) -> f64 {
        let footprint = item.bounds.translated(x, y);
        let merged = occupied.map_or(footprint, |b| b.union(&footprint));
        match self.config.placement_type {
            PlacementType::BoundingBox => merged.area(),
            PlacementType::Gravity => 2.0 * merged.width() + merged.height(),
            PlacementType::BottomLeft => x + self.config.bottom_left_weight * y,
        }
    }

    /// Fitness contribution of a used sheet beyond its area, in `[0, 1]` for a
    /// layout that stays on the sheet.
    fn sheet_metric(&self, sheet: &Sheet, occupied: &Bounds) -> f64 {
        match self.config.placement_type {
            PlacementType::Gravity => {
                let extent = 2.0 * sheet.width() + sheet.height();
                if extent > 0.0 {
                    (2.0 * occupied.width() + occupied.height()) / extent
                } else {
                    0.0
                }
            }
            PlacementType::BoundingBox | PlacementType::BottomLeft => {
                let area = sheet.area();
                if area > 0.0 {
                    occupied.area() / area
                } else {
                    0.0
                }
            }
        }
    }

    fn sheet_nfp(&self, sheet: &Sheet, part: OrderedPart<'_>) -> Result<CachedNfp> {
        let key = NfpKey::sheet(sheet.source(), part.polygon.source, part.rotation);
        self.cache.get_or_compute(key, || {
            self.engine
                .calculate_nfp(&sheet.polygon, part.polygon, 0.0, part.rotation, NfpMode::Inner)
        })
    }

    fn pair_nfp(&self, fixed: OrderedPart<'_>, moving: OrderedPart<'_>) -> Result<CachedNfp> {
        let key = NfpKey::new(
            fixed.polygon.source,
            moving.polygon.source,
            fixed.rotation,
            moving.rotation,
            NfpMode::Outer,
        );
        self.cache.get_or_compute(key, || {
            self.engine.calculate_nfp(
                fixed.polygon,
                moving.polygon,
                fixed.rotation,
                moving.rotation,
                NfpMode::Outer,
            )
        })
    }
}

/// Ascending `x`, then ascending `y`.
fn scan_order(a: (f64, f64), b: (f64, f64)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;
    use crate::minkowski::MinkowskiBackend;
    use sheetnest_core::ScalingConfig;

    fn engine() -> NfpEngine {
        NfpEngine::new(MinkowskiBackend::Fallback, ScalingConfig::default())
    }

    fn part(id: usize, source: usize, width: f64, height: f64) -> Polygon {
        let mut p = Polygon::rectangle(width, height);
        p.id = id;
        p.source = source;
        p
    }

    fn sheet(id: usize, source: usize, width: f64, height: f64) -> Sheet {
        let mut s = Sheet::rectangle(width, height);
        s.id = id;
        s.polygon.source = source;
        s
    }

    fn overlaps(a: (f64, f64, f64, f64), b: (f64, f64, f64, f64)) -> bool {
        let eps = 1e-6;
        a.0 + a.2 > b.0 + eps
            && b.0 + b.2 > a.0 + eps
            && a.1 + a.3 > b.1 + eps
            && b.1 + b.3 > a.1 + eps
    }

    #[test]
    fn test_two_rectangles_on_one_sheet() {
        let engine = engine();
        let cache = NfpCache::new();
        let config = Config::new().with_placement_type(PlacementType::BoundingBox);
        let a = part(0, 0, 250.0, 220.0);
        let b = part(1, 0, 250.0, 220.0);
        let sheets = vec![sheet(0, 1, 3000.0, 1500.0)];

        let parts = vec![OrderedPart::new(&a, 0.0), OrderedPart::new(&b, 0.0)];
        let result = PlacementWorker::new(&engine, &cache, &config)
            .place_parts(&parts, &sheets)
            .unwrap();

        assert!(result.all_placed());
        assert_eq!(result.used_sheet_count(), 1);
        let p = &result.sheets[0].placements;
        assert_eq!((p[0].x, p[0].y), (0.0, 0.0));
        assert!(!overlaps(
            (p[0].x, p[0].y, 250.0, 220.0),
            (p[1].x, p[1].y, 250.0, 220.0)
        ));
        assert!(result.utilization > 0.0);
        assert!((result.sheets[0].placed_area - 2.0 * 250.0 * 220.0).abs() < 1e-6);
        assert!(result.valid);
    }

    #[test]
    fn test_repeated_instance_marks_layout_invalid() {
        let engine = engine();
        let cache = NfpCache::new();
        let config = Config::new();
        let a = part(0, 0, 250.0, 220.0);
        let sheets = vec![sheet(0, 1, 3000.0, 1500.0)];

        let parts = vec![OrderedPart::new(&a, 0.0), OrderedPart::new(&a, 0.0)];
        let result = PlacementWorker::new(&engine, &cache, &config)
            .place_parts(&parts, &sheets)
            .unwrap();

        assert_eq!(result.total_placed_count(), 2);
        assert!(!result.valid);
    }

    #[test]
    fn test_oversized_part_is_unplaced() {
        let engine = engine();
        let cache = NfpCache::new();
        let config = Config::new();
        let big = part(0, 0, 4000.0, 100.0);
        let small = part(1, 1, 100.0, 100.0);
        let sheets = vec![sheet(0, 2, 3000.0, 1500.0)];

        let parts = vec![OrderedPart::new(&big, 0.0), OrderedPart::new(&small, 0.0)];
        let result = PlacementWorker::new(&engine, &cache, &config)
            .place_parts(&parts, &sheets)
            .unwrap();

        assert_eq!(result.unplaced.len(), 1);
        assert_eq!(result.unplaced[0].id, 0);
        assert_eq!(result.total_placed_count(), 1);
        // The penalty dominates the sheet terms.
        assert!(result.fitness > UNPLACED_PENALTY * 0.05);
    }

    #[test]
    fn test_part_moves_to_next_sheet() {
        let engine = engine();
        let cache = NfpCache::new();
        let config = Config::new();
        let long = part(0, 0, 2000.0, 100.0);
        let sheets = vec![sheet(0, 1, 1000.0, 1000.0), sheet(1, 2, 3000.0, 1500.0)];

        let result = PlacementWorker::new(&engine, &cache, &config)
            .place_parts(&[OrderedPart::new(&long, 0.0)], &sheets)
            .unwrap();

        assert!(result.all_placed());
        assert_eq!(result.used_sheet_count(), 1);
        assert_eq!(result.sheets[0].sheet_id, 1);
    }

    #[test]
    fn test_part_goes_into_hole() {
        let engine = engine();
        let cache = NfpCache::new();
        let config = Config::new().with_placement_type(PlacementType::BottomLeft);
        let mut frame = Polygon::rectangle(100.0, 100.0).with_hole(vec![
            (10.0, 10.0),
            (10.0, 90.0),
            (90.0, 90.0),
            (90.0, 10.0),
        ]);
        frame.id = 0;
        frame.source = 0;
        let small = part(1, 1, 20.0, 20.0);
        let sheets = vec![sheet(0, 2, 1000.0, 1000.0)];

        let parts = vec![OrderedPart::new(&frame, 0.0), OrderedPart::new(&small, 0.0)];
        let result = PlacementWorker::new(&engine, &cache, &config)
            .place_parts(&parts, &sheets)
            .unwrap();

        let (_, p) = result.placement_of(1).unwrap();
        assert!((p.x - 10.0).abs() < 1e-6);
        assert!((p.y - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_exact_fit_sheet() {
        let engine = engine();
        let cache = NfpCache::new();
        let config = Config::new();
        let a = part(0, 0, 100.0, 50.0);
        let b = part(1, 0, 100.0, 50.0);
        let c = part(2, 0, 100.0, 50.0);
        let sheets = vec![sheet(0, 1, 100.0, 100.0)];

        let parts = vec![
            OrderedPart::new(&a, 0.0),
            OrderedPart::new(&b, 0.0),
            OrderedPart::new(&c, 0.0),
        ];
        let result = PlacementWorker::new(&engine, &cache, &config)
            .place_parts(&parts, &sheets)
            .unwrap();

        assert_eq!(result.total_placed_count(), 2);
        assert_eq!(result.unplaced.len(), 1);
        let p = &result.sheets[0].placements;
        assert_eq!((p[0].x, p[0].y), (0.0, 0.0));
        assert!((p[1].y - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic_from_cold_cache() {
        let engine = engine();
        let config = Config::new().with_placement_type(PlacementType::Gravity);
        let polygons: Vec<Polygon> = (0..8)
            .map(|i| part(i, i % 3, 120.0 + 10.0 * (i % 3) as f64, 80.0))
            .collect();
        let parts: Vec<OrderedPart> = polygons
            .iter()
            .enumerate()
            .map(|(i, p)| OrderedPart::new(p, if i % 2 == 0 { 0.0 } else { 90.0 }))
            .collect();
        let sheets = vec![sheet(0, 3, 500.0, 400.0)];

        let run = || {
            let cache = NfpCache::new();
            PlacementWorker::new(&engine, &cache, &config)
                .place_parts(&parts, &sheets)
                .unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(first.sheets, second.sheets);
        assert_eq!(first.fitness.to_bits(), second.fitness.to_bits());
    }
}
