//! # Sheetnest 2D
//!
//! Irregular 2D nesting of polygon parts on stock sheets.
//!
//! The search is a genetic algorithm over part orderings and rotations. Every
//! chromosome is decoded by NFP-guided placement:
//!
//! - **NFP engine** ([`NfpEngine`]): outer and inner no-fit polygons by Minkowski sums,
//!   on an accelerated or a fallback [`MinkowskiBackend`]
//! - **Cache** ([`NfpCache`]): sharded memoization shared by all workers
//! - **Pair scheduler** ([`PairScheduler`]): resolves the NFPs a chromosome needs
//! - **Placement worker** ([`PlacementWorker`]): places parts sheet by sheet
//! - **Orchestrator** ([`NestingContext`]): the `start` / `iterate` / `stop` lifecycle
//!
//! ## Quick Start
//!
//! ```rust
//! use sheetnest_d2::{Config, IterationOutcome, NestingContext, PlacementType, Polygon, Sheet};
//!
//! let parts = vec![
//!     Polygon::rectangle(250.0, 220.0).with_quantity(4),
//!     Polygon::l_shape(120.0, 120.0, 40.0, 40.0).with_quantity(2),
//! ];
//! let sheets = vec![Sheet::rectangle(1000.0, 600.0)];
//! let config = Config::new()
//!     .with_placement_type(PlacementType::BoundingBox)
//!     .with_population_size(6)
//!     .with_seed(1);
//!
//! let mut ctx = NestingContext::new(parts, sheets, config);
//! ctx.start().unwrap();
//! for _ in 0..2 {
//!     if let IterationOutcome::Stagnated = ctx.iterate().unwrap() {
//!         break;
//!     }
//! }
//!
//! let best = ctx.current_best().unwrap().unwrap();
//! println!("{} placed, utilization {}", best.total_placed_count(), best.utilization_percent());
//! ```
//!
//! ## Feature Flags
//!
//! - `accelerated` (default): parallel Minkowski unions on the rayon pool
//! - `serde`: Enable serialization/deserialization support

pub mod cache;
pub mod clipping;
pub mod geometry;
pub mod initializer;
pub mod minkowski;
pub mod nester;
pub mod nfp;
pub mod pairs;
pub mod placement;

// Re-exports
pub use cache::{CacheStats, CachedNfp, NfpCache, NfpKey};
pub use geometry::{Bounds, Polygon, PolygonArena, Sheet};
pub use initializer::{plan_sheets, prepare, PreparedNest, SheetSize};
pub use minkowski::MinkowskiBackend;
pub use nester::{IterationOutcome, Layout, NestingContext, PartLayout, SheetLayout, StopHandle};
pub use nfp::{Nfp, NfpEngine, NfpMode};
pub use pairs::{NfpPair, OrderedPart, PairScheduler, ResolvedPair};
pub use placement::PlacementWorker;
pub use sheetnest_core::{
    Config, Error, MessageSink, MinkowskiPolicy, NestResult, NestStats, PlacementType,
    ProgressSink, Result, RotationConstraint, ScalingConfig,
};
