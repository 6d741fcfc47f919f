//! Benchmark suite for sheetnest
//!
//! This crate provides:
//! - Synthetic instance generation (rectangles, L-shapes, framed parts with holes)
//! - A runner that drives the nesting lifecycle and reports results as JSON

mod runner;
mod synthetic;

pub use runner::{BenchmarkConfig, BenchmarkRunner, RunReport};
pub use synthetic::{Instance, SyntheticGenerator};
