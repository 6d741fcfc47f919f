//! Benchmark runner driving a [`NestingContext`] over an instance.

use crate::synthetic::Instance;
use serde::{Deserialize, Serialize};
use sheetnest_core::{Config, NestStats, NestSummary, ProgressSink, Result};
use sheetnest_d2::{IterationOutcome, NestingContext};
use std::time::Instant;

/// Configuration for benchmark runs.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Maximum number of `iterate()` calls per run.
    pub iterations: u32,
    /// Nesting configuration handed to the context.
    pub nest: Config,
    /// Whether to log progress updates.
    pub show_progress: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            nest: Config::default(),
            show_progress: false,
        }
    }
}

impl BenchmarkConfig {
    /// Creates a new benchmark configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_nest_config(mut self, config: Config) -> Self {
        self.nest = config;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

/// Outcome of one benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub instance: String,
    pub part_count: usize,
    pub iterations: u32,
    pub stagnated: bool,
    /// Best retained result, if any layout placed a part.
    pub best: Option<NestSummary>,
    pub stats: NestStats,
    pub elapsed_ms: u64,
}

/// Benchmark runner.
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
}

impl BenchmarkRunner {
    /// Creates a new benchmark runner.
    pub fn new(config: BenchmarkConfig) -> Self {
        Self { config }
    }

    /// Runs the configured number of iterations on an instance.
    ///
    /// Stops early when the search stagnates.
    pub fn run(&self, instance: &Instance) -> Result<RunReport> {
        let mut ctx = NestingContext::new(
            instance.parts.clone(),
            instance.sheets.clone(),
            self.config.nest.clone(),
        );
        if self.config.show_progress {
            ctx = ctx.with_progress(ProgressSink::Log);
        }

        let start = Instant::now();
        ctx.start()?;

        let mut iterations = 0;
        let mut stagnated = false;
        while iterations < self.config.iterations {
            iterations += 1;
            match ctx.iterate()? {
                IterationOutcome::Evaluated { .. } => {}
                IterationOutcome::Stagnated => {
                    stagnated = true;
                    break;
                }
                IterationOutcome::Stopped => break,
            }
        }
        ctx.stop();

        let best = ctx.current_best()?.as_ref().map(NestSummary::from);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &best {
            Some(b) => log::info!(
                "{}: {} iterations in {} ms, {}/{} placed at {:.1}%",
                instance.name,
                iterations,
                elapsed_ms,
                b.total_placed,
                b.total_requested,
                b.utilization_percent
            ),
            None => log::warn!("{}: no layout placed any part", instance.name),
        }

        Ok(RunReport {
            instance: instance.name.clone(),
            part_count: instance.part_count(),
            iterations,
            stagnated,
            best,
            stats: ctx.stats(),
            elapsed_ms,
        })
    }
}
