//! Synthetic instance generator.
//!
//! Produces reproducible part and sheet sets for benchmarking the nester.

use rand::prelude::*;
use sheetnest_d2::{Polygon, Sheet};

/// A nesting instance: parts to place and the sheets offered for them.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub parts: Vec<Polygon>,
    pub sheets: Vec<Sheet>,
}

impl Instance {
    /// Total number of part instances after quantity expansion.
    pub fn part_count(&self) -> usize {
        self.parts.iter().map(|p| p.quantity).sum()
    }

    /// Total area of all part instances.
    pub fn parts_area(&self) -> f64 {
        self.parts.iter().map(|p| p.area() * p.quantity as f64).sum()
    }
}

/// Generator for synthetic benchmark instances.
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    rng: StdRng,
}

impl SyntheticGenerator {
    /// Creates a new generator with a random seed.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a new generator with a specific seed for reproducibility.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 200 identical 250x220 rectangles on five 3000x1500 sheets.
    pub fn sample(&self) -> Instance {
        Instance {
            name: "sample".to_string(),
            parts: vec![Polygon::rectangle(250.0, 220.0).with_quantity(200)],
            sheets: vec![Sheet::rectangle(3000.0, 1500.0).with_quantity(5)],
        }
    }

    /// Random rectangles of varying aspect ratio.
    pub fn rectangles(&mut self, kinds: usize, sheet_width: f64, sheet_height: f64) -> Instance {
        let parts = (0..kinds)
            .map(|_| {
                let w = self.rng.gen_range(40.0..300.0);
                let h = self.rng.gen_range(40.0..300.0);
                Polygon::rectangle(w, h).with_quantity(self.rng.gen_range(1..=6))
            })
            .collect();

        Instance {
            name: "synthetic_rectangles".to_string(),
            parts,
            sheets: vec![Sheet::rectangle(sheet_width, sheet_height).with_quantity(4)],
        }
    }

    /// Rectangles, L-shapes and square frames whose holes can take small parts.
    pub fn mixed(&mut self, kinds: usize, sheet_width: f64, sheet_height: f64) -> Instance {
        let parts = (0..kinds)
            .map(|_| {
                let quantity = self.rng.gen_range(1..=4);
                match self.rng.gen_range(0..3) {
                    0 => self.rectangle().with_quantity(quantity),
                    1 => self.l_shape().with_quantity(quantity),
                    _ => self.frame().with_quantity(quantity),
                }
            })
            .collect();

        Instance {
            name: "synthetic_mixed".to_string(),
            parts,
            sheets: vec![Sheet::rectangle(sheet_width, sheet_height).with_quantity(4)],
        }
    }

    fn rectangle(&mut self) -> Polygon {
        let w = self.rng.gen_range(20.0..120.0);
        let h = self.rng.gen_range(20.0..120.0);
        Polygon::rectangle(w, h)
    }

    fn l_shape(&mut self) -> Polygon {
        let w = self.rng.gen_range(60.0..200.0);
        let h = self.rng.gen_range(60.0..200.0);
        let nw = w * self.rng.gen_range(0.3..0.7);
        let nh = h * self.rng.gen_range(0.3..0.7);
        Polygon::l_shape(w, h, nw, nh)
    }

    fn frame(&mut self) -> Polygon {
        let size = self.rng.gen_range(150.0..300.0);
        let wall = size * self.rng.gen_range(0.1..0.25);
        // Hole wound clockwise.
        Polygon::rectangle(size, size).with_hole(vec![
            (wall, wall),
            (wall, size - wall),
            (size - wall, size - wall),
            (size - wall, wall),
        ])
    }
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new()
    }
}
