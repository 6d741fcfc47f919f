//! Error types shared by all sheetnest crates.

use thiserror::Error;

/// Errors raised by the nesting pipeline.
///
/// Unplaced parts and stagnation are outcomes, not errors, and never appear here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A part polygon is malformed (too few points, zero area, ...).
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A sheet polygon is malformed or collapsed after offsetting.
    #[error("Invalid boundary: {0}")]
    InvalidBoundary(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An NFP computation produced degenerate or empty geometry.
    #[error("Geometry computation failed: {0}")]
    GeometryFailure(String),

    /// The accelerated Minkowski backend is missing and the policy forbids falling back.
    #[error(
        "Native Minkowski acceleration unavailable: {0}. \
         Build with the `accelerated` feature or set the Minkowski policy to `Fallback`"
    )]
    NativeAccelerationUnavailable(String),

    /// `iterate()` was called before `start()`.
    #[error("Nest has not been started")]
    NotStarted,

    /// Lock poisoning or another broken internal invariant.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the error must terminate the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NativeAccelerationUnavailable(_) | Error::Internal(_)
        )
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;
