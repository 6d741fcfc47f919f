//! Nesting configuration.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Placement heuristic used to pick an anchor among free positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PlacementType {
    /// Minimize the area of the rectangle enclosing everything placed on the sheet.
    BoundingBox,
    /// Minimize `2 * width + height` of the occupied rectangle (pulls parts to the left).
    #[default]
    Gravity,
    /// Minimize `x + weight * y` of the anchor.
    BottomLeft,
}

/// What to do when the accelerated Minkowski backend is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MinkowskiPolicy {
    /// Prefer the accelerated backend, use the pure fallback when missing.
    #[default]
    Fallback,
    /// Require the accelerated backend; starting a nest fails without it.
    FailFast,
    /// Always use the pure fallback.
    FallbackOnly,
}

/// Nesting configuration. Immutable once a nest is started.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Minimum gap between parts.
    pub spacing: f64,

    /// Minimum gap between parts and sheet edges.
    pub sheet_spacing: f64,

    /// Number of evenly spaced rotation candidates.
    pub rotations: usize,

    // GA parameters
    /// Population size.
    pub population_size: usize,

    /// Per-gene point mutation probability (0.0 - 1.0).
    pub mutation_rate: f64,

    /// Survivors per generation turnover; also the protected range of the ranking store.
    pub elite_count: usize,

    /// Maximum number of results kept by the ranking store.
    pub top_results_capacity: usize,

    // Placement
    /// Placement heuristic.
    pub placement_type: PlacementType,

    /// Weight of `y` in the bottom-left score.
    pub bottom_left_weight: f64,

    /// Whether parts may be placed inside holes of other parts.
    pub use_holes: bool,

    // Execution
    /// Evaluate the population on parallel workers.
    pub use_parallel: bool,

    /// Number of balanced population ranges when parallel.
    pub worker_ranges: usize,

    /// Memoize NFPs across evaluations.
    pub use_minkowski_cache: bool,

    /// Maximum number of cached NFPs.
    pub cache_capacity: usize,

    /// Integer scale applied around boolean polygon operations.
    pub clipper_scale: f64,

    /// Minkowski backend selection policy.
    pub minkowski_policy: MinkowskiPolicy,

    /// Time budget in milliseconds for finding distinct offspring in one turnover.
    pub procreation_timeout_ms: u64,

    /// Time budget in milliseconds for one `iterate()` call (None = unlimited).
    pub generation_time_limit_ms: Option<u64>,

    /// RNG seed (None = from entropy).
    pub seed: Option<u64>,

    // Sheet planning
    /// Quantity multiplier used when planning sheets.
    pub multiplier: usize,

    /// Expected usable fraction of a sheet when planning sheets.
    pub packing_efficiency: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spacing: 0.0,
            sheet_spacing: 0.0,
            rotations: 4,
            population_size: 10,
            mutation_rate: 0.1,
            elite_count: 2,
            top_results_capacity: 10,
            placement_type: PlacementType::default(),
            bottom_left_weight: 2.0,
            use_holes: true,
            use_parallel: true,
            worker_ranges: 3,
            use_minkowski_cache: true,
            cache_capacity: 200_000,
            clipper_scale: 10_000_000.0,
            minkowski_policy: MinkowskiPolicy::default(),
            procreation_timeout_ms: 1000,
            generation_time_limit_ms: None,
            seed: None,
            multiplier: 1,
            packing_efficiency: 0.8,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the spacing between parts.
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    /// Sets the spacing between parts and sheet edges.
    pub fn with_sheet_spacing(mut self, spacing: f64) -> Self {
        self.sheet_spacing = spacing;
        self
    }

    /// Sets the number of rotation candidates.
    pub fn with_rotations(mut self, rotations: usize) -> Self {
        self.rotations = rotations.max(1);
        self
    }

    /// Sets the population size.
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size.max(2);
        self
    }

    /// Sets the mutation rate.
    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the elite count.
    pub fn with_elite_count(mut self, count: usize) -> Self {
        self.elite_count = count;
        self
    }

    /// Sets the ranking store bound.
    pub fn with_top_results_capacity(mut self, capacity: usize) -> Self {
        self.top_results_capacity = capacity.max(1);
        self
    }

    /// Sets the placement heuristic.
    pub fn with_placement_type(mut self, placement_type: PlacementType) -> Self {
        self.placement_type = placement_type;
        self
    }

    /// Enables or disables hole-aware placement.
    pub fn with_holes(mut self, use_holes: bool) -> Self {
        self.use_holes = use_holes;
        self
    }

    /// Enables or disables parallel evaluation.
    pub fn with_parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    /// Enables or disables the NFP cache.
    pub fn with_minkowski_cache(mut self, enabled: bool) -> Self {
        self.use_minkowski_cache = enabled;
        self
    }

    /// Sets the Minkowski backend policy.
    pub fn with_minkowski_policy(mut self, policy: MinkowskiPolicy) -> Self {
        self.minkowski_policy = policy;
        self
    }

    /// Sets the per-iteration time budget.
    pub fn with_generation_time_limit(mut self, ms: u64) -> Self {
        self.generation_time_limit_ms = Some(ms);
        self
    }

    /// Sets the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of offspring slots filled by crossover in each turnover.
    pub fn offspring_count(&self) -> usize {
        self.population_size.saturating_sub(self.elite_count)
    }

    /// Checks the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.spacing.is_finite() || self.spacing < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "spacing must be a non-negative number, got {}",
                self.spacing
            )));
        }
        if !self.sheet_spacing.is_finite() || self.sheet_spacing < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "sheet spacing must be a non-negative number, got {}",
                self.sheet_spacing
            )));
        }
        if self.rotations == 0 {
            return Err(Error::InvalidConfig("rotations must be at least 1".into()));
        }
        if self.population_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "population size must be at least 2, got {}",
                self.population_size
            )));
        }
        if self.elite_count >= self.population_size {
            return Err(Error::InvalidConfig(format!(
                "elite count ({}) must be smaller than the population size ({})",
                self.elite_count, self.population_size
            )));
        }
        if self.top_results_capacity == 0 {
            return Err(Error::InvalidConfig(
                "top results capacity must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(Error::InvalidConfig(format!(
                "mutation rate must be within 0..=1, got {}",
                self.mutation_rate
            )));
        }
        if !self.clipper_scale.is_finite() || self.clipper_scale < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "clipper scale must be at least 1, got {}",
                self.clipper_scale
            )));
        }
        if !(self.packing_efficiency > 0.0 && self.packing_efficiency <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "packing efficiency must be within (0, 1], got {}",
                self.packing_efficiency
            )));
        }
        Ok(())
    }
}
