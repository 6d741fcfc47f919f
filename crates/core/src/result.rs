//! Nest result representation.

use crate::geometry::{angle_key, PolygonId, SheetId, Source};
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Quantization used when comparing placements for duplicates.
const SIGNATURE_RESOLUTION: f64 = 1e6;

/// Position of one part instance on a sheet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartPlacement {
    /// Part instance identifier.
    pub id: PolygonId,
    /// Logical part identifier.
    pub source: Source,
    /// Translation of the rotated part, sheet-relative.
    pub x: f64,
    pub y: f64,
    /// Rotation in degrees.
    pub rotation: f64,
    /// Insertion order within the whole result.
    pub order: usize,
}

/// All placements made on one sheet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SheetPlacement {
    /// Sheet instance identifier.
    pub sheet_id: SheetId,
    /// Logical sheet identifier.
    pub sheet_source: Source,
    /// Area of the sheet.
    pub sheet_area: f64,
    /// Net area of the parts placed on the sheet.
    pub placed_area: f64,
    /// Placements in insertion order.
    pub placements: Vec<PartPlacement>,
}

impl SheetPlacement {
    /// Creates an empty sheet placement.
    pub fn new(sheet_id: SheetId, sheet_source: Source, sheet_area: f64) -> Self {
        Self {
            sheet_id,
            sheet_source,
            sheet_area,
            placed_area: 0.0,
            placements: Vec::new(),
        }
    }

    /// Utilization ratio of this sheet (0.0 - 1.0).
    pub fn utilization(&self) -> f64 {
        if self.sheet_area > 0.0 {
            self.placed_area / self.sheet_area
        } else {
            0.0
        }
    }
}

/// A part instance that fits on no sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnplacedPart {
    pub id: PolygonId,
    pub source: Source,
}

/// Evaluated outcome of one chromosome. Lower fitness is better.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestResult {
    /// Sheets that received at least one part, in use order.
    pub sheets: Vec<SheetPlacement>,

    /// Fitness score (lower is better).
    pub fitness: f64,

    /// False when the evaluation produced an inconsistent layout.
    pub valid: bool,

    /// Parts that could not be placed.
    pub unplaced: Vec<UnplacedPart>,

    /// Placed area divided by the area of the used sheets (0.0 - 1.0).
    pub utilization: f64,

    /// Time spent in NFP resolution, in milliseconds.
    pub nfp_time_ms: u64,

    /// Time spent placing parts, in milliseconds.
    pub placement_time_ms: u64,

    /// Generation that produced this result.
    pub generation: u32,
}

impl NestResult {
    /// Creates an empty, valid result with the worst possible fitness.
    pub fn new() -> Self {
        Self {
            sheets: Vec::new(),
            fitness: f64::MAX,
            valid: true,
            unplaced: Vec::new(),
            utilization: 0.0,
            nfp_time_ms: 0,
            placement_time_ms: 0,
            generation: 0,
        }
    }

    /// Number of sheets used.
    pub fn used_sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Total number of placed part instances.
    pub fn total_placed_count(&self) -> usize {
        self.sheets.iter().map(|s| s.placements.len()).sum()
    }

    /// Returns true if every part was placed.
    pub fn all_placed(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// Total time spent evaluating the chromosome.
    pub fn nest_time_ms(&self) -> u64 {
        self.nfp_time_ms + self.placement_time_ms
    }

    /// Iterates over every placement with the sheet it belongs to.
    pub fn placements(&self) -> impl Iterator<Item = (&SheetPlacement, &PartPlacement)> {
        self.sheets
            .iter()
            .flat_map(|s| s.placements.iter().map(move |p| (s, p)))
    }

    /// Finds the placement of a part instance.
    pub fn placement_of(&self, id: PolygonId) -> Option<(&SheetPlacement, &PartPlacement)> {
        self.placements().find(|(_, p)| p.id == id)
    }

    /// Checks that the layout can be trusted: finite figures, and every part
    /// instance placed at most once and never both placed and unplaced.
    pub fn is_consistent(&self) -> bool {
        if !self.fitness.is_finite() || !(0.0..=1.0 + 1e-9).contains(&self.utilization) {
            return false;
        }
        let mut seen = HashSet::new();
        self.placements()
            .all(|(_, p)| p.x.is_finite() && p.y.is_finite() && seen.insert(p.id))
            && self.unplaced.iter().all(|u| !seen.contains(&u.id))
    }

    /// Returns utilization as a percentage string.
    pub fn utilization_percent(&self) -> String {
        format!("{:.1}%", self.utilization * 100.0)
    }

    /// Order-independent fingerprint of the layout.
    ///
    /// Two results with the same parts (by source) at the same quantized positions and
    /// rotations on the same sheets share a signature.
    pub fn signature(&self) -> ResultSignature {
        let mut entries: Vec<SignatureEntry> = self
            .placements()
            .map(|(sheet, p)| SignatureEntry {
                sheet: sheet.sheet_id,
                source: p.source,
                x: (p.x * SIGNATURE_RESOLUTION).round() as i64,
                y: (p.y * SIGNATURE_RESOLUTION).round() as i64,
                rotation: angle_key(p.rotation),
            })
            .collect();
        entries.sort_unstable();
        ResultSignature(entries)
    }
}

impl Default for NestResult {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SignatureEntry {
    sheet: SheetId,
    source: Source,
    x: i64,
    y: i64,
    rotation: i32,
}

/// Fingerprint used to reject duplicate layouts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultSignature(Vec<SignatureEntry>);

/// Summary statistics for a nest result.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestSummary {
    /// Total part instances requested.
    pub total_requested: usize,
    /// Total part instances placed.
    pub total_placed: usize,
    /// Utilization percentage.
    pub utilization_percent: f64,
    /// Number of sheets used.
    pub sheets_used: usize,
    /// Fitness of the result.
    pub fitness: f64,
    /// Evaluation time in milliseconds.
    pub time_ms: u64,
}

impl From<&NestResult> for NestSummary {
    fn from(result: &NestResult) -> Self {
        let placed = result.total_placed_count();
        Self {
            total_requested: placed + result.unplaced.len(),
            total_placed: placed,
            utilization_percent: result.utilization * 100.0,
            sheets_used: result.used_sheet_count(),
            fitness: result.fitness,
            time_ms: result.nest_time_ms(),
        }
    }
}
