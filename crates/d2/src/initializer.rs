//! Nest initialization: identifiers, validation, quantity expansion, spacing offsets
//! and sheet planning.

use crate::geometry::{Polygon, PolygonArena, Sheet};
use sheetnest_core::robust::TOLERANCE;
use sheetnest_core::{Config, Error, Gene, Result};

/// Parts and sheets ready for nesting.
#[derive(Debug, Clone)]
pub struct PreparedNest {
    /// Part instances, offset for spacing; ids are arena indices.
    pub parts: PolygonArena,
    /// Sheet instances, offset for spacing, with unique ids.
    pub sheets: Vec<Sheet>,
    /// One gene per part instance, in arena order.
    pub genes: Vec<Gene>,
}

impl PreparedNest {
    /// Sum of the net areas of all part instances.
    pub fn parts_area(&self) -> f64 {
        self.parts.total_area()
    }

    /// Sum of the areas of all sheet instances.
    pub fn sheets_area(&self) -> f64 {
        self.sheets.iter().map(Sheet::area).sum()
    }
}

/// Builds the working set of a nest.
///
/// Sources are assigned to parts first (`0..parts.len()`), then to sheets. Each part
/// is expanded into `quantity` instances and each sheet into `quantity` sheets. Parts
/// grow by `spacing / 2` and sheets shrink by `sheet_spacing - spacing / 2`.
pub fn prepare(parts: &[Polygon], sheets: &[Sheet], config: &Config) -> Result<PreparedNest> {
    config.validate()?;
    if parts.is_empty() {
        return Err(Error::InvalidGeometry("no parts to nest".into()));
    }
    if sheets.is_empty() {
        return Err(Error::InvalidBoundary("no sheets to nest on".into()));
    }

    let part_offset = config.spacing / 2.0;
    let sheet_offset = -(config.sheet_spacing - config.spacing / 2.0);

    let mut arena = PolygonArena::new();
    let mut genes = Vec::new();
    for (source, part) in parts.iter().enumerate() {
        let mut part = part.clone();
        part.source = source;
        part.id = source;
        part.close();
        part.validate()?;
        if part.quantity == 0 {
            return Err(Error::InvalidGeometry(format!(
                "part {} has zero quantity",
                source
            )));
        }

        let part = part.offset(part_offset)?;
        let angles = part.rotation_constraint.angles(config.rotations);
        let area = part.area();
        for _ in 0..part.quantity {
            arena.insert(part.clone());
            genes.push(Gene::new(source, area, angles.clone()));
        }
    }

    let mut expanded = Vec::new();
    for (index, sheet) in sheets.iter().enumerate() {
        let mut sheet = sheet.clone();
        sheet.polygon.source = parts.len() + index;
        sheet.id = expanded.len();
        sheet.polygon.close();
        sheet.validate()?;

        let polygon = sheet.polygon.offset(sheet_offset).map_err(|e| {
            Error::InvalidBoundary(format!("sheet {} is too small for its spacing: {}", index, e))
        })?;
        for _ in 0..sheet.quantity {
            expanded.push(Sheet {
                id: expanded.len(),
                polygon: polygon.clone(),
                material: sheet.material.clone(),
                quantity: 1,
            });
        }
    }
    if expanded.is_empty() {
        return Err(Error::InvalidBoundary("all sheets have zero quantity".into()));
    }

    log::info!(
        "Prepared {} part instances from {} parts on {} sheets",
        arena.len(),
        parts.len(),
        expanded.len()
    );
    Ok(PreparedNest {
        parts: arena,
        sheets: expanded,
        genes,
    })
}

/// A sheet size offered to [`plan_sheets`].
#[derive(Debug, Clone, PartialEq)]
pub struct SheetSize {
    pub width: f64,
    pub height: f64,
    pub material: String,
}

impl SheetSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            material: String::new(),
        }
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = material.into();
        self
    }

    /// Area expected to be filled once spacing and packing efficiency are applied.
    fn usable_area(&self, config: &Config) -> f64 {
        let width = self.width - 2.0 * config.sheet_spacing;
        let height = self.height - 2.0 * config.sheet_spacing;
        if width <= 0.0 || height <= 0.0 {
            return 0.0;
        }
        width * height * config.packing_efficiency
    }
}

/// Picks sheets until the parts' area (times `config.multiplier`) is covered.
///
/// Sizes are considered largest first. Each step takes the smallest size that covers
/// the remaining area on its own, or the largest size when none does.
pub fn plan_sheets(sizes: &[SheetSize], parts: &[Polygon], config: &Config) -> Result<Vec<Sheet>> {
    let mut ordered: Vec<&SheetSize> = sizes
        .iter()
        .filter(|s| s.usable_area(config) > TOLERANCE)
        .collect();
    if ordered.is_empty() {
        return Err(Error::InvalidBoundary(
            "no sheet size leaves usable area after spacing".into(),
        ));
    }
    ordered.sort_by(|a, b| (b.width * b.height).total_cmp(&(a.width * a.height)));

    let mut remaining: f64 = parts
        .iter()
        .map(|p| p.area() * (p.quantity * config.multiplier) as f64)
        .sum();

    let mut sheets = Vec::new();
    loop {
        let pick = ordered
            .iter()
            .rev()
            .find(|s| s.usable_area(config) >= remaining)
            .unwrap_or(&ordered[0]);

        let mut sheet = Sheet::rectangle(pick.width, pick.height).with_material(&pick.material);
        sheet.id = sheets.len();
        sheets.push(sheet);

        remaining -= pick.usable_area(config);
        if remaining <= 0.0 {
            break;
        }
    }

    log::debug!("Planned {} sheets", sheets.len());
    Ok(sheets)
}
