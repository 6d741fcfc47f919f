//! Run counters shared between the orchestrator and its workers.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lock-free counters describing a nesting run.
#[derive(Debug, Default)]
pub struct NestState {
    generations: AtomicU32,
    iterations: AtomicU32,
    population: AtomicUsize,
    nest_count: AtomicU64,
    rejected: AtomicU64,
    threads: AtomicUsize,
    accelerated_calls: AtomicU64,
    fallback_calls: AtomicU64,
    last_nest_time_ms: AtomicU64,
    total_nest_time_ms: AtomicU64,
    last_placement_time_ms: AtomicU64,
    total_placement_time_ms: AtomicU64,
    errored: AtomicBool,
}

impl NestState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every counter and the errored flag.
    pub fn reset(&self) {
        self.generations.store(0, Ordering::Relaxed);
        self.iterations.store(0, Ordering::Relaxed);
        self.population.store(0, Ordering::Relaxed);
        self.nest_count.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.threads.store(0, Ordering::Relaxed);
        self.accelerated_calls.store(0, Ordering::Relaxed);
        self.fallback_calls.store(0, Ordering::Relaxed);
        self.last_nest_time_ms.store(0, Ordering::Relaxed);
        self.total_nest_time_ms.store(0, Ordering::Relaxed);
        self.last_placement_time_ms.store(0, Ordering::Relaxed);
        self.total_placement_time_ms.store(0, Ordering::Relaxed);
        self.errored.store(false, Ordering::SeqCst);
    }

    pub fn increment_generations(&self) {
        self.generations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_iterations(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_population(&self, population: usize) {
        self.population.store(population, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_threads(&self) {
        self.threads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_threads(&self) {
        // Saturate at zero.
        let _ = self
            .threads
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| t.checked_sub(1));
    }

    pub fn record_accelerated_call(&self) {
        self.accelerated_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_call(&self) {
        self.fallback_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one completed evaluation with its timings.
    pub fn record_nest(&self, nest_time_ms: u64, placement_time_ms: u64) {
        self.nest_count.fetch_add(1, Ordering::Relaxed);
        self.last_nest_time_ms.store(nest_time_ms, Ordering::Relaxed);
        self.total_nest_time_ms
            .fetch_add(nest_time_ms, Ordering::Relaxed);
        self.last_placement_time_ms
            .store(placement_time_ms, Ordering::Relaxed);
        self.total_placement_time_ms
            .fetch_add(placement_time_ms, Ordering::Relaxed);
    }

    /// Marks the run as errored. Returns true only for the call that made the transition.
    pub fn set_errored(&self) -> bool {
        self.errored
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> u32 {
        self.generations.load(Ordering::Relaxed)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn population(&self) -> usize {
        self.population.load(Ordering::Relaxed)
    }

    pub fn nest_count(&self) -> u64 {
        self.nest_count.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn threads(&self) -> usize {
        self.threads.load(Ordering::Relaxed)
    }

    /// Takes a consistent-enough copy of all counters.
    ///
    /// `cache_hit_ratio` is supplied by the caller since the cache lives elsewhere.
    pub fn snapshot(&self, cache_hit_ratio: f64) -> NestStats {
        let nest_count = self.nest_count();
        let total_nest = self.total_nest_time_ms.load(Ordering::Relaxed);
        let total_placement = self.total_placement_time_ms.load(Ordering::Relaxed);
        NestStats {
            generations: self.generations(),
            iterations: self.iterations(),
            population: self.population(),
            nest_count,
            rejected: self.rejected(),
            threads: self.threads(),
            accelerated_calls: self.accelerated_calls.load(Ordering::Relaxed),
            fallback_calls: self.fallback_calls.load(Ordering::Relaxed),
            last_nest_time_ms: self.last_nest_time_ms.load(Ordering::Relaxed),
            average_nest_time_ms: total_nest.checked_div(nest_count).unwrap_or(0),
            last_placement_time_ms: self.last_placement_time_ms.load(Ordering::Relaxed),
            average_placement_time_ms: total_placement.checked_div(nest_count).unwrap_or(0),
            cache_hit_ratio,
            errored: self.is_errored(),
        }
    }
}

/// Point-in-time copy of [`NestState`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NestStats {
    pub generations: u32,
    pub iterations: u32,
    pub population: usize,
    pub nest_count: u64,
    pub rejected: u64,
    pub threads: usize,
    pub accelerated_calls: u64,
    pub fallback_calls: u64,
    pub last_nest_time_ms: u64,
    pub average_nest_time_ms: u64,
    pub last_placement_time_ms: u64,
    pub average_placement_time_ms: u64,
    /// Cache hits divided by lookups (0.0 when nothing was looked up).
    pub cache_hit_ratio: f64,
    pub errored: bool,
}
