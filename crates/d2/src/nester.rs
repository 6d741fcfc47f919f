//! Nest orchestration: the `start` / `iterate` / `stop` lifecycle.
//!
//! [`NestingContext`] owns everything a run needs. `iterate()` evaluates the pending
//! chromosomes of the current generation (split into balanced ranges on the rayon
//! pool when parallel), offers every result to the ranking store and turns the
//! generation over once it is fully evaluated. The caller drives the loop; `stop()`
//! may be called from another thread through a [`StopHandle`].

use crate::cache::NfpCache;
use crate::geometry::{Polygon, Sheet};
use crate::initializer::{self, PreparedNest};
use crate::minkowski::MinkowskiBackend;
use crate::nfp::NfpEngine;
use crate::pairs::{OrderedPart, PairScheduler};
use crate::placement::PlacementWorker;
use sheetnest_core::{
    Chromosome, Config, Error, GeneticController, MessageSink, NestResult, NestState, NestStats,
    PolygonId, ProgressInfo, ProgressSink, Result, ScalingConfig, SheetId, Source,
    TopNestResults, TryAddResult, Turnover,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Horizontal gap between sheets in display coordinates.
const SHEET_GAP: f64 = 10.0;

/// Message shown when the search keeps producing known nests.
const STAGNATION_MESSAGE: &str = "recalculating the same nests over and over";

/// Outcome of one [`NestingContext::iterate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Chromosomes were evaluated. `complete` is true when the whole generation is.
    Evaluated {
        generation: u32,
        evaluated: usize,
        complete: bool,
    },
    /// The search has stagnated; further iterations do nothing.
    Stagnated,
    /// A stop was requested.
    Stopped,
}

/// Cloneable handle that stops a running nest at its next checkpoint.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A sheet in display coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SheetLayout {
    pub sheet_id: SheetId,
    pub source: Source,
    pub material: String,
    /// Left edge of the sheet in display coordinates.
    pub x: f64,
    pub width: f64,
    pub height: f64,
    pub utilization: f64,
}

/// A part instance in display coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartLayout {
    pub id: PolygonId,
    pub source: Source,
    /// Sheet holding the part; `None` when unplaced.
    pub sheet: Option<SheetId>,
    /// Display position of the rotated part; `None` when unplaced.
    pub position: Option<(f64, f64)>,
    pub rotation: f64,
    /// Placement order; `None` when unplaced.
    pub order: Option<usize>,
}

impl PartLayout {
    pub fn is_placed(&self) -> bool {
        self.position.is_some()
    }
}

/// The best result re-expressed for display.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Layout {
    pub sheets: Vec<SheetLayout>,
    pub parts: Vec<PartLayout>,
    pub fitness: f64,
    pub utilization: f64,
}

impl Layout {
    pub fn placed(&self) -> impl Iterator<Item = &PartLayout> {
        self.parts.iter().filter(|p| p.is_placed())
    }

    pub fn unplaced(&self) -> impl Iterator<Item = &PartLayout> {
        self.parts.iter().filter(|p| !p.is_placed())
    }
}

/// Context of one nesting run.
#[derive(Debug)]
pub struct NestingContext {
    config: Config,
    parts: Vec<Polygon>,
    sheets: Vec<Sheet>,
    progress: ProgressSink,
    messages: MessageSink,
    nest: Option<PreparedNest>,
    engine: Option<NfpEngine>,
    controller: Option<GeneticController>,
    cache: NfpCache,
    top: TopNestResults,
    state: NestState,
    stopped: Arc<AtomicBool>,
    stagnated: bool,
}

impl NestingContext {
    /// Creates a context for `parts` (with quantities) on `sheets`. Nothing is
    /// validated until [`NestingContext::start`].
    pub fn new(parts: Vec<Polygon>, sheets: Vec<Sheet>, config: Config) -> Self {
        Self {
            cache: NfpCache::with_capacity(config.cache_capacity),
            top: TopNestResults::new(config.top_results_capacity, config.elite_count),
            config,
            parts,
            sheets,
            progress: ProgressSink::default(),
            messages: MessageSink::default(),
            nest: None,
            engine: None,
            controller: None,
            state: NestState::new(),
            stopped: Arc::new(AtomicBool::new(false)),
            stagnated: false,
        }
    }

    /// Sets the progress sink.
    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Sets the message sink.
    pub fn with_messages(mut self, messages: MessageSink) -> Self {
        self.messages = messages;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resets the run and builds the initial population.
    ///
    /// Fails with `NativeAccelerationUnavailable` when the policy demands the
    /// accelerated backend and this build lacks it, and with an input error when a
    /// part or sheet is invalid.
    pub fn start(&mut self) -> Result<()> {
        self.reset()?;

        let backend = match MinkowskiBackend::detect(self.config.minkowski_policy) {
            Ok(backend) => backend,
            Err(e) => {
                self.fail(&format!(
                    "{}. Set the Minkowski policy to Fallback to nest without it.",
                    e
                ));
                return Err(e);
            }
        };
        let engine = NfpEngine::new(backend, ScalingConfig::with_factor(self.config.clipper_scale))
            .with_holes(self.config.use_holes);

        let nest = initializer::prepare(&self.parts, &self.sheets, &self.config)?;
        let controller = GeneticController::new(nest.genes.clone(), &self.config)?;

        self.state.set_population(controller.population().len());
        log::info!(
            "Nest started: {} parts, {} sheets, {:?} Minkowski backend",
            nest.parts.len(),
            nest.sheets.len(),
            backend
        );
        self.progress.message("Nest started");

        self.engine = Some(engine);
        self.nest = Some(nest);
        self.controller = Some(controller);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.stopped.store(false, Ordering::SeqCst);
        self.stagnated = false;
        self.state.reset();
        self.cache.clear();
        self.top.clear()?;
        self.nest = None;
        self.engine = None;
        self.controller = None;
        Ok(())
    }

    /// Evaluates the pending chromosomes of the current generation, turning the
    /// generation over first if it is already complete.
    ///
    /// Returns once the dispatched work is done, a stop was requested, or the
    /// generation time limit passed.
    pub fn iterate(&mut self) -> Result<IterationOutcome> {
        let (Some(controller), Some(nest), Some(engine)) =
            (self.controller.as_mut(), self.nest.as_ref(), self.engine)
        else {
            return Err(Error::NotStarted);
        };
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(IterationOutcome::Stopped);
        }
        if self.stagnated {
            return Ok(IterationOutcome::Stagnated);
        }
        self.state.increment_iterations();

        if controller.is_generation_complete() {
            match controller.generate()? {
                Turnover::NextGeneration {
                    generation,
                    distinct,
                } => {
                    self.state.increment_generations();
                    log::info!(
                        "Generation {} with {} new chromosomes",
                        generation,
                        distinct
                    );
                }
                Turnover::Stagnated => {
                    self.stagnated = true;
                    log::warn!("Search stagnated after {} generations", controller.generation());
                    self.progress.message(STAGNATION_MESSAGE);
                    return Ok(IterationOutcome::Stagnated);
                }
            }
        }

        let generation = controller.generation();
        let population = controller.population().len();
        self.state.set_population(population);

        let evaluator = Evaluator {
            config: &self.config,
            engine,
            cache: &self.cache,
            nest,
            top: &self.top,
            state: &self.state,
            progress: &self.progress,
            messages: &self.messages,
            stopped: &self.stopped,
            deadline: self
                .config
                .generation_time_limit_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
            generation,
            population,
            evaluated: AtomicUsize::new(controller.evaluated_count()),
            dispatched: AtomicUsize::new(0),
        };

        let chromosomes = controller.population_mut();
        let ranges = self.config.worker_ranges.max(1);
        if self.config.use_parallel && ranges > 1 && chromosomes.len() > 1 {
            let chunk_size = chromosomes.len().div_ceil(ranges);
            let evaluator = &evaluator;
            rayon::scope(|s| {
                for range in chromosomes.chunks_mut(chunk_size) {
                    s.spawn(move |_| evaluator.evaluate_range(range));
                }
            });
        } else {
            evaluator.evaluate_range(chromosomes);
        }

        let evaluated = evaluator.dispatched.load(Ordering::Relaxed);
        if self.stopped.load(Ordering::SeqCst) {
            log::info!("Nest stopped after {} evaluations in this iteration", evaluated);
            return Ok(IterationOutcome::Stopped);
        }
        Ok(IterationOutcome::Evaluated {
            generation,
            evaluated,
            complete: controller.is_generation_complete(),
        })
    }

    /// Requests the run to stop at its next checkpoint.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Handle for stopping the run from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stopped))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.controller.is_some()
    }

    pub fn is_stagnated(&self) -> bool {
        self.stagnated
    }

    /// Best result found so far.
    pub fn current_best(&self) -> Result<Option<NestResult>> {
        self.top.top()
    }

    /// Retained results, best first.
    pub fn top_results(&self) -> Result<Vec<NestResult>> {
        self.top.snapshot()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> NestStats {
        self.state.snapshot(self.cache.hit_ratio())
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        self.cache.hit_ratio()
    }

    pub fn cache(&self) -> &NfpCache {
        &self.cache
    }

    /// Current population, if started.
    pub fn population(&self) -> Option<&[Chromosome]> {
        self.controller.as_ref().map(|c| c.population())
    }

    /// Prepared part instances, if started.
    pub fn nest(&self) -> Option<&PreparedNest> {
        self.nest.as_ref()
    }

    /// Applies the best result to the part instances and returns it in display
    /// coordinates. Used sheets are laid out left to right, `SHEET_GAP` apart.
    ///
    /// Returns `Ok(None)` when no result has been accepted yet.
    pub fn assign_placement(&mut self) -> Result<Option<Layout>> {
        let Some(nest) = self.nest.as_mut() else {
            return Err(Error::NotStarted);
        };
        let Some(best) = self.top.top()? else {
            return Ok(None);
        };

        let mut sheets = Vec::with_capacity(best.sheets.len());
        let mut parts = Vec::with_capacity(nest.parts.len());
        let mut offset = 0.0;
        for placement in &best.sheets {
            let Some(sheet) = nest.sheets.iter().find(|s| s.id == placement.sheet_id) else {
                return Err(Error::Internal(format!(
                    "result references unknown sheet {}",
                    placement.sheet_id
                )));
            };
            let bounds = sheet.polygon.bounds().unwrap_or_default();

            for p in &placement.placements {
                let x = offset + p.x - bounds.min_x;
                let y = p.y - bounds.min_y;
                if let Some(polygon) = nest.parts.get_mut(p.id) {
                    polygon.x = x;
                    polygon.y = y;
                    polygon.sheet = Some(sheet.id);
                }
                parts.push(PartLayout {
                    id: p.id,
                    source: p.source,
                    sheet: Some(sheet.id),
                    position: Some((x, y)),
                    rotation: p.rotation,
                    order: Some(p.order),
                });
            }

            sheets.push(SheetLayout {
                sheet_id: sheet.id,
                source: sheet.source(),
                material: sheet.material.clone(),
                x: offset,
                width: bounds.width(),
                height: bounds.height(),
                utilization: placement.utilization(),
            });
            offset += bounds.width() + SHEET_GAP;
        }

        for unplaced in &best.unplaced {
            if let Some(polygon) = nest.parts.get_mut(unplaced.id) {
                polygon.sheet = None;
            }
            parts.push(PartLayout {
                id: unplaced.id,
                source: unplaced.source,
                sheet: None,
                position: None,
                rotation: 0.0,
                order: None,
            });
        }

        Ok(Some(Layout {
            sheets,
            parts,
            fitness: best.fitness,
            utilization: best.utilization,
        }))
    }

    fn fail(&self, text: &str) {
        if self.state.set_errored() {
            log::error!("{}", text);
            self.messages.fatal(text);
        }
    }
}

/// Shared, read-only view of a run used by the evaluation workers.
struct Evaluator<'a> {
    config: &'a Config,
    engine: NfpEngine,
    cache: &'a NfpCache,
    nest: &'a PreparedNest,
    top: &'a TopNestResults,
    state: &'a NestState,
    progress: &'a ProgressSink,
    messages: &'a MessageSink,
    stopped: &'a AtomicBool,
    deadline: Option<Instant>,
    generation: u32,
    population: usize,
    /// Evaluated chromosomes in this generation, for the progress percentage.
    evaluated: AtomicUsize,
    /// Chromosomes evaluated by this call.
    dispatched: AtomicUsize,
}

impl Evaluator<'_> {
    fn should_stop(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Evaluates the pending chromosomes of one population range.
    fn evaluate_range(&self, range: &mut [Chromosome]) {
        self.state.increment_threads();
        for chromosome in range.iter_mut() {
            if self.should_stop() {
                break;
            }
            if !chromosome.begin_processing() {
                continue;
            }

            let fitness = self.run_guarded(|| self.evaluate(chromosome));
            chromosome.set_evaluated(fitness);
            self.dispatched.fetch_add(1, Ordering::Relaxed);
        }
        self.state.decrement_threads();
    }

    /// Runs one evaluation and records its result. An error or a panic fails the run
    /// and gives the chromosome the worst fitness.
    fn run_guarded<F>(&self, evaluation: F) -> f64
    where
        F: FnOnce() -> Result<NestResult>,
    {
        match panic::catch_unwind(AssertUnwindSafe(evaluation)) {
            Ok(Ok(result)) => {
                let fitness = result.fitness;
                self.record(result);
                fitness
            }
            Ok(Err(e)) => {
                self.fail(&format!("Evaluation failed: {}", e));
                f64::MAX
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.fail(&format!("Evaluation panicked: {}", reason));
                f64::MAX
            }
        }
    }

    /// Resolves the NFP pairs of a chromosome and places it.
    fn evaluate(&self, chromosome: &Chromosome) -> Result<NestResult> {
        let parts: Vec<OrderedPart> = chromosome
            .order
            .iter()
            .zip(&chromosome.rotations)
            .map(|(&index, &rotation)| {
                self.nest
                    .parts
                    .get(index)
                    .map(|polygon| OrderedPart::new(polygon, rotation))
                    .ok_or_else(|| Error::Internal(format!("chromosome references part {}", index)))
            })
            .collect::<Result<_>>()?;

        // Without memoization every evaluation starts from an empty cache.
        let local;
        let cache = if self.config.use_minkowski_cache {
            self.cache
        } else {
            local = NfpCache::with_capacity(self.config.cache_capacity);
            &local
        };

        let nfp_start = Instant::now();
        PairScheduler::new(&self.engine, cache)
            .with_parallel(self.config.use_parallel)
            .with_state(self.state)
            .generate(&parts)?;
        let nfp_time_ms = nfp_start.elapsed().as_millis() as u64;

        let mut result = PlacementWorker::new(&self.engine, cache, self.config)
            .place_parts(&parts, &self.nest.sheets)?;
        result.nfp_time_ms = nfp_time_ms;
        result.generation = self.generation;
        self.state
            .record_nest(result.nest_time_ms(), result.placement_time_ms);
        Ok(result)
    }

    /// Offers a result to the ranking store and reports progress.
    ///
    /// Rejection and progress are independent: a result with at least one placed part
    /// triggers a report even when the ranking store turns it away. The report shows
    /// the best stored layout.
    fn record(&self, result: NestResult) {
        let evaluated = self.evaluated.fetch_add(1, Ordering::Relaxed) + 1;
        let placed = result.total_placed_count();
        let total = self.nest.parts.len();
        let utilization = result.utilization;
        let fitness = result.fitness;

        if !result.valid || placed == 0 {
            self.state.increment_rejected();
            log::debug!("Rejected result with {} placed parts", placed);
        } else {
            match self.top.try_add(result) {
                Ok(TryAddResult::Added { position: 0, .. }) => {
                    log::info!(
                        "New best: fitness {:.3}, {}/{} placed, utilization {:.1}%",
                        fitness,
                        placed,
                        total,
                        utilization * 100.0
                    );
                }
                Ok(TryAddResult::Added { .. }) => {}
                Ok(TryAddResult::Duplicate) | Ok(TryAddResult::Rejected) => {
                    self.state.increment_rejected();
                }
                Err(e) => self.fail(&format!("Ranking store failure: {}", e)),
            }
        }

        if placed > 0 {
            // Figures come from the best stored layout, not from this one.
            let (fitness, utilization, placed) = match self.top.top() {
                Ok(Some(best)) => (best.fitness, best.utilization, best.total_placed_count()),
                _ => (fitness, utilization, placed),
            };
            self.progress.report(
                ProgressInfo::new()
                    .with_percent(evaluated as f64 / self.population.max(1) as f64)
                    .with_generation(self.generation, self.population)
                    .with_fitness(fitness)
                    .with_utilization(utilization)
                    .with_items(placed, total),
            );
        }
    }

    fn fail(&self, text: &str) {
        if self.state.set_errored() {
            log::error!("{}", text);
            self.messages.fatal(text);
        } else {
            log::debug!("{}", text);
        }
    }
}
