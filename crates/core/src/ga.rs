//! Genetic algorithm controller for part orderings and rotations.
//!
//! The controller owns a population of [`Chromosome`]s. Evaluation happens outside
//! (the orchestrator drives each chromosome through `Pending -> Processing ->
//! Evaluated`); once the whole generation is evaluated, [`GeneticController::generate`]
//! turns it over in place:
//!
//! - the `elite_count` fittest chromosomes survive unchanged,
//! - the remaining slots are filled with children of rank-weighted parents produced by
//!   order crossover and point mutation,
//! - children already seen in an earlier generation are retried until the procreation
//!   timeout expires.
//!
//! When a turnover cannot find a single unseen child the search has stagnated and the
//! population is cleared instead of looping on the same nests.

use crate::config::Config;
use crate::geometry::{angle_key, Source};
use crate::{Error, Result};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Attempts per offspring slot before accepting an already-seen child.
const MAX_PROCREATION_ATTEMPTS: usize = 64;

/// Static description of one part instance as seen by the GA.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gene {
    /// Logical part the instance belongs to.
    pub source: Source,
    /// Net area, used to order the initial individual.
    pub area: f64,
    /// Allowed rotation angles in degrees. Never empty.
    pub angles: Vec<f64>,
}

impl Gene {
    /// Creates a gene, falling back to a single 0 degree rotation when `angles` is empty.
    pub fn new(source: Source, area: f64, angles: Vec<f64>) -> Self {
        let angles = if angles.is_empty() { vec![0.0] } else { angles };
        Self {
            source,
            area,
            angles,
        }
    }
}

/// Evaluation state of a chromosome within one generation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChromosomeState {
    #[default]
    Pending,
    Processing,
    /// Fitness of the evaluated chromosome (lower is better).
    Evaluated(f64),
}

/// A candidate solution: the order in which parts are placed and the rotation of each.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Chromosome {
    /// Part indices in placement order (a permutation of `0..n`).
    pub order: Vec<usize>,
    /// Rotation in degrees of the part at the same position in `order`.
    pub rotations: Vec<f64>,
    /// Evaluation state.
    pub state: ChromosomeState,
}

impl Chromosome {
    /// Creates a pending chromosome.
    pub fn new(order: Vec<usize>, rotations: Vec<f64>) -> Self {
        Self {
            order,
            rotations,
            state: ChromosomeState::Pending,
        }
    }

    /// Number of genes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the chromosome has no genes.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Fitness if evaluated.
    pub fn fitness(&self) -> Option<f64> {
        match self.state {
            ChromosomeState::Evaluated(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == ChromosomeState::Pending
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(self.state, ChromosomeState::Evaluated(_))
    }

    /// Moves a pending chromosome to `Processing`. Returns false if it was not pending.
    pub fn begin_processing(&mut self) -> bool {
        if self.is_pending() {
            self.state = ChromosomeState::Processing;
            true
        } else {
            false
        }
    }

    /// Records the fitness of the chromosome.
    pub fn set_evaluated(&mut self, fitness: f64) {
        self.state = ChromosomeState::Evaluated(fitness);
    }

    /// Resets the chromosome for a new generation.
    pub fn reset(&mut self) {
        self.state = ChromosomeState::Pending;
    }

    /// Rotation of `part` in this chromosome.
    fn rotation_of(&self, part: usize) -> f64 {
        self.order
            .iter()
            .position(|&p| p == part)
            .map(|i| self.rotations[i])
            .unwrap_or(0.0)
    }

    /// Identity of the nest this chromosome produces: sources and rotations in order.
    pub fn signature(&self, genes: &[Gene]) -> Vec<(Source, i32)> {
        self.order
            .iter()
            .zip(&self.rotations)
            .map(|(&p, &r)| (genes.get(p).map_or(p, |g| g.source), angle_key(r)))
            .collect()
    }
}

/// Outcome of a generation turnover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turnover {
    /// A new generation was produced; `distinct` children were never seen before.
    NextGeneration { generation: u32, distinct: usize },
    /// No unseen child could be produced. The population has been cleared.
    Stagnated,
}

/// Population owner and generation turnover.
#[derive(Debug)]
pub struct GeneticController {
    genes: Vec<Gene>,
    population: Vec<Chromosome>,
    population_size: usize,
    elite_count: usize,
    mutation_rate: f64,
    procreation_timeout: Duration,
    generation: u32,
    seen: HashSet<Vec<(Source, i32)>>,
    rng: StdRng,
}

impl GeneticController {
    /// Creates the initial population.
    ///
    /// The first individual places parts by descending area with random rotations; the
    /// others are mutated copies of it.
    pub fn new(genes: Vec<Gene>, config: &Config) -> Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut controller = Self {
            genes,
            population: Vec::with_capacity(config.population_size),
            population_size: config.population_size,
            elite_count: config.elite_count,
            mutation_rate: config.mutation_rate,
            procreation_timeout: Duration::from_millis(config.procreation_timeout_ms),
            generation: 0,
            seen: HashSet::new(),
            rng,
        };
        controller.initialize();
        Ok(controller)
    }

    fn initialize(&mut self) {
        let mut order: Vec<usize> = (0..self.genes.len()).collect();
        // Stable sort keeps input order among equal areas.
        order.sort_by(|&a, &b| self.genes[b].area.total_cmp(&self.genes[a].area));

        let rotations = order
            .iter()
            .map(|&p| self.random_angle(p))
            .collect();
        let adam = Chromosome::new(order, rotations);
        self.seen.insert(adam.signature(&self.genes));

        self.population.push(adam.clone());
        while self.population.len() < self.population_size {
            let mut child = adam.clone();
            self.mutate(&mut child);
            self.seen.insert(child.signature(&self.genes));
            self.population.push(child);
        }
    }

    fn random_angle(&mut self, part: usize) -> f64 {
        let angles = &self.genes[part].angles;
        angles[self.rng.gen_range(0..angles.len())]
    }

    /// Static gene descriptions.
    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    /// Current population.
    pub fn population(&self) -> &[Chromosome] {
        &self.population
    }

    /// Mutable access for the orchestrator's state transitions.
    pub fn population_mut(&mut self) -> &mut [Chromosome] {
        &mut self.population
    }

    /// Number of completed turnovers.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Returns true once every chromosome is evaluated. An empty population is never
    /// complete.
    pub fn is_generation_complete(&self) -> bool {
        !self.population.is_empty() && self.population.iter().all(Chromosome::is_evaluated)
    }

    /// Number of evaluated chromosomes in the current generation.
    pub fn evaluated_count(&self) -> usize {
        self.population.iter().filter(|c| c.is_evaluated()).count()
    }

    /// Best evaluated chromosome of the current generation.
    pub fn best(&self) -> Option<&Chromosome> {
        self.population
            .iter()
            .filter_map(|c| c.fitness().map(|f| (c, f)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)
    }

    /// Turns the evaluated generation over in place.
    pub fn generate(&mut self) -> Result<Turnover> {
        if !self.is_generation_complete() {
            return Err(Error::Internal(format!(
                "turnover requested with {} of {} chromosomes evaluated",
                self.evaluated_count(),
                self.population.len()
            )));
        }

        let mut ranked = std::mem::take(&mut self.population);
        ranked.sort_by(|a, b| {
            let fa = a.fitness().unwrap_or(f64::MAX);
            let fb = b.fitness().unwrap_or(f64::MAX);
            fa.total_cmp(&fb)
        });

        let mut next: Vec<Chromosome> = ranked
            .iter()
            .take(self.elite_count)
            .cloned()
            .map(|mut c| {
                c.reset();
                c
            })
            .collect();

        let offspring = self.population_size.saturating_sub(next.len());
        let deadline = Instant::now() + self.procreation_timeout;
        let mut distinct = 0;

        for _ in 0..offspring {
            let mut candidate = None;
            let mut attempts = 0;
            loop {
                let child = self.procreate(&ranked);
                attempts += 1;
                if self.seen.insert(child.signature(&self.genes)) {
                    distinct += 1;
                    candidate = Some(child);
                    break;
                }
                if attempts >= MAX_PROCREATION_ATTEMPTS || Instant::now() >= deadline {
                    candidate.get_or_insert(child);
                    break;
                }
                candidate = Some(child);
            }
            if let Some(child) = candidate {
                next.push(child);
            }
        }

        if offspring > 0 && distinct == 0 {
            log::warn!(
                "Generation {} produced no unseen offspring, stopping",
                self.generation
            );
            self.population.clear();
            return Ok(Turnover::Stagnated);
        }

        self.population = next;
        self.generation += 1;
        log::debug!(
            "Generation {} ready: {} distinct offspring of {}",
            self.generation,
            distinct,
            offspring
        );

        Ok(Turnover::NextGeneration {
            generation: self.generation,
            distinct,
        })
    }

    fn procreate(&mut self, ranked: &[Chromosome]) -> Chromosome {
        let first = self.weighted_index(ranked.len(), None);
        let second = self.weighted_index(ranked.len(), Some(first));
        let mut child = self.order_crossover(&ranked[first], &ranked[second]);
        self.mutate(&mut child);
        child
    }

    /// Picks an index from a fitness-sorted population, favoring the front.
    ///
    /// Rank `i` of `n` owns a slice of `[0, 1)` proportional to `n - i`.
    fn weighted_index(&mut self, len: usize, exclude: Option<usize>) -> usize {
        let candidates: Vec<usize> = (0..len).filter(|&i| Some(i) != exclude).collect();
        if candidates.is_empty() {
            return 0;
        }
        let n = candidates.len();
        let total = (n * (n + 1) / 2) as f64;
        let mut r = self.rng.gen::<f64>() * total;
        for (rank, &idx) in candidates.iter().enumerate() {
            let weight = (n - rank) as f64;
            if r < weight {
                return idx;
            }
            r -= weight;
        }
        candidates[0]
    }

    /// Order crossover (OX). Rotations travel with their parts.
    fn order_crossover(&mut self, a: &Chromosome, b: &Chromosome) -> Chromosome {
        let n = a.order.len();
        if n < 2 {
            return Chromosome::new(a.order.clone(), a.rotations.clone());
        }

        let (mut p1, mut p2) = (self.rng.gen_range(0..n), self.rng.gen_range(0..n));
        if p1 > p2 {
            std::mem::swap(&mut p1, &mut p2);
        }

        let mut order = vec![usize::MAX; n];
        let mut rotations = vec![0.0; n];
        let mut used = vec![false; n];

        for i in p1..=p2 {
            order[i] = a.order[i];
            rotations[i] = a.rotations[i];
            used[a.order[i]] = true;
        }

        let mut donor = b.order.iter().copied().filter(|&p| !used[p]);
        for offset in 0..n {
            let idx = (p2 + 1 + offset) % n;
            if order[idx] != usize::MAX {
                continue;
            }
            if let Some(part) = donor.next() {
                order[idx] = part;
                rotations[idx] = b.rotation_of(part);
            }
        }

        Chromosome::new(order, rotations)
    }

    /// Point mutation: each position may swap with its successor and may pick a new
    /// rotation, each with probability `mutation_rate`.
    fn mutate(&mut self, chromosome: &mut Chromosome) {
        let n = chromosome.order.len();
        for i in 0..n {
            if i + 1 < n && self.rng.gen::<f64>() < self.mutation_rate {
                chromosome.order.swap(i, i + 1);
                chromosome.rotations.swap(i, i + 1);
            }
            if self.rng.gen::<f64>() < self.mutation_rate {
                let part = chromosome.order[i];
                chromosome.rotations[i] = self.random_angle(part);
            }
        }
        chromosome.reset();
    }

    /// Drops the population and history.
    pub fn clear(&mut self) {
        self.population.clear();
        self.seen.clear();
        self.generation = 0;
    }
}
