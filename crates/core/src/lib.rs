//! # Sheetnest Core
//!
//! Dimension-independent building blocks of the sheetnest engine.
//!
//! ## Core Components
//!
//! - **Configuration**: [`Config`], [`PlacementType`], [`MinkowskiPolicy`]
//! - **GA controller**: [`GeneticController`], [`Chromosome`], [`Turnover`]
//! - **Results**: [`NestResult`], [`SheetPlacement`], [`PartPlacement`], [`NestSummary`]
//! - **Ranking**: [`TopNestResults`] keeps the best distinct results with an elite range
//! - **Run state**: [`NestState`] counters and [`NestStats`] snapshots
//! - **Reporting**: [`ProgressSink`] and [`MessageSink`]
//! - **Numerics**: robust orientation predicates and [`ScalingConfig`] integer scaling
//!
//! ## Configuration
//!
//! ```rust
//! use sheetnest_core::{Config, PlacementType};
//!
//! let config = Config::new()
//!     .with_placement_type(PlacementType::BoundingBox)
//!     .with_spacing(2.0)
//!     .with_population_size(12)
//!     .with_seed(42);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support

pub mod config;
pub mod error;
pub mod ga;
pub mod geometry;
pub mod progress;
pub mod ranking;
pub mod result;
pub mod robust;
pub mod state;

// Re-exports
pub use config::{Config, MinkowskiPolicy, PlacementType};
pub use error::{Error, Result};
pub use ga::{Chromosome, ChromosomeState, Gene, GeneticController, Turnover};
pub use geometry::{angle_key, normalize_angle, PolygonId, RotationConstraint, SheetId, Source};
pub use progress::{MessageSink, Notice, ProgressEvent, ProgressInfo, ProgressSink, Severity};
pub use ranking::{TopNestResults, TryAddResult};
pub use result::{
    NestResult, NestSummary, PartPlacement, ResultSignature, SheetPlacement, UnplacedPart,
};
pub use robust::{PointLocation, ScalingConfig};
pub use state::{NestState, NestStats};
