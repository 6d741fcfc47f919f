//! NFP pair scheduling.
//!
//! Before a chromosome can be placed, the outer NFP of every ordered pair of its
//! parts (at their chromosome rotations) must be in the cache. The scheduler
//! enumerates the distinct pairs that are still missing and resolves them, on the
//! rayon pool when parallel evaluation is enabled. [`PairScheduler::generate`]
//! returns only once every pair is resolved.

use crate::cache::{CachedNfp, NfpCache, NfpKey};
use crate::geometry::Polygon;
use crate::minkowski::MinkowskiBackend;
use crate::nfp::{NfpEngine, NfpMode};
use rayon::prelude::*;
use sheetnest_core::{NestState, Result};
use std::collections::HashSet;

/// A part instance at its chromosome rotation.
#[derive(Debug, Clone, Copy)]
pub struct OrderedPart<'a> {
    pub polygon: &'a Polygon,
    pub rotation: f64,
}

impl<'a> OrderedPart<'a> {
    pub fn new(polygon: &'a Polygon, rotation: f64) -> Self {
        Self { polygon, rotation }
    }
}

/// One outer NFP computation: `b` orbiting a fixed `a`.
#[derive(Debug, Clone, Copy)]
pub struct NfpPair<'a> {
    pub a: &'a Polygon,
    pub b: &'a Polygon,
    pub rotation_a: f64,
    pub rotation_b: f64,
    pub key: NfpKey,
}

impl<'a> NfpPair<'a> {
    pub fn new(a: OrderedPart<'a>, b: OrderedPart<'a>) -> Self {
        Self {
            a: a.polygon,
            b: b.polygon,
            rotation_a: a.rotation,
            rotation_b: b.rotation,
            key: NfpKey::new(
                a.polygon.source,
                b.polygon.source,
                a.rotation,
                b.rotation,
                NfpMode::Outer,
            ),
        }
    }
}

/// A pair together with its cached outcome (`None` when the geometry failed).
#[derive(Debug, Clone)]
pub struct ResolvedPair {
    pub key: NfpKey,
    pub nfp: CachedNfp,
}

/// Resolves the NFP pairs of a chromosome into a shared cache.
#[derive(Debug, Clone, Copy)]
pub struct PairScheduler<'a> {
    engine: &'a NfpEngine,
    cache: &'a NfpCache,
    state: Option<&'a NestState>,
    parallel: bool,
}

impl<'a> PairScheduler<'a> {
    pub fn new(engine: &'a NfpEngine, cache: &'a NfpCache) -> Self {
        Self {
            engine,
            cache,
            state: None,
            parallel: false,
        }
    }

    /// Resolve pairs on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Counts backend calls into `state`.
    pub fn with_state(mut self, state: &'a NestState) -> Self {
        self.state = Some(state);
        self
    }

    /// Distinct pairs of `parts` not yet cached, in placement order.
    ///
    /// Every part is paired with each part placed before it, the earlier part being
    /// the fixed one.
    pub fn pending_pairs(&self, parts: &[OrderedPart<'a>]) -> Vec<NfpPair<'a>> {
        let mut seen = HashSet::new();
        let mut pairs = Vec::new();
        for (i, &moving) in parts.iter().enumerate() {
            for &fixed in &parts[..i] {
                let pair = NfpPair::new(fixed, moving);
                if seen.insert(pair.key) && !self.cache.contains(&pair.key) {
                    pairs.push(pair);
                }
            }
        }
        pairs
    }

    /// Computes and caches every missing pair of `parts`.
    ///
    /// A pair whose geometry fails is cached as absent; only fatal errors abort.
    pub fn generate(&self, parts: &[OrderedPart<'a>]) -> Result<Vec<ResolvedPair>> {
        let pairs = self.pending_pairs(parts);
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!(
            "Resolving {} NFP pairs for {} parts ({})",
            pairs.len(),
            parts.len(),
            if self.parallel { "parallel" } else { "sequential" }
        );

        if self.parallel {
            pairs.par_iter().map(|pair| self.resolve(pair)).collect()
        } else {
            pairs.iter().map(|pair| self.resolve(pair)).collect()
        }
    }

    fn resolve(&self, pair: &NfpPair<'a>) -> Result<ResolvedPair> {
        let nfp = self.cache.get_or_compute(pair.key, || {
            self.record_call();
            self.engine.calculate_nfp(
                pair.a,
                pair.b,
                pair.rotation_a,
                pair.rotation_b,
                NfpMode::Outer,
            )
        })?;
        Ok(ResolvedPair { key: pair.key, nfp })
    }

    fn record_call(&self) {
        if let Some(state) = self.state {
            match self.engine.backend {
                MinkowskiBackend::Accelerated => state.record_accelerated_call(),
                MinkowskiBackend::Fallback => state.record_fallback_call(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetnest_core::ScalingConfig;

    fn engine() -> NfpEngine {
        NfpEngine::new(MinkowskiBackend::Fallback, ScalingConfig::default())
    }

    fn part(source: usize, width: f64, height: f64) -> Polygon {
        let mut p = Polygon::rectangle(width, height);
        p.source = source;
        p
    }

    #[test]
    fn test_pending_pairs_are_deduplicated() {
        let engine = engine();
        let cache = NfpCache::new();
        let a = part(0, 10.0, 10.0);
        let b = part(1, 5.0, 5.0);
        let b2 = b.clone();

        let parts = vec![
            OrderedPart::new(&a, 0.0),
            OrderedPart::new(&b, 90.0),
            OrderedPart::new(&b2, 90.0),
        ];
        let scheduler = PairScheduler::new(&engine, &cache);
        let pairs = scheduler.pending_pairs(&parts);

        // (a, b) and (b, b); the second (a, b) is the same key.
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].key, NfpKey::new(0, 1, 0.0, 90.0, NfpMode::Outer));
        assert_eq!(pairs[1].key, NfpKey::new(1, 1, 90.0, 90.0, NfpMode::Outer));
    }

    #[test]
    fn test_generate_fills_cache_once() {
        let engine = engine();
        let cache = NfpCache::new();
        let state = NestState::new();
        let a = part(0, 10.0, 10.0);
        let b = part(1, 5.0, 5.0);
        let parts = vec![OrderedPart::new(&a, 0.0), OrderedPart::new(&b, 0.0)];

        let scheduler = PairScheduler::new(&engine, &cache).with_state(&state);
        let resolved = scheduler.generate(&parts).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].nfp.is_some());
        assert_eq!(cache.len(), 1);
        assert_eq!(state.snapshot(0.0).fallback_calls, 1);

        // Everything is cached now.
        assert!(scheduler.generate(&parts).unwrap().is_empty());
        assert_eq!(state.snapshot(0.0).fallback_calls, 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let engine = engine();
        let polygons: Vec<Polygon> = (0..6)
            .map(|i| part(i, 10.0 + i as f64, 5.0 + i as f64))
            .collect();
        let parts: Vec<OrderedPart> = polygons
            .iter()
            .enumerate()
            .map(|(i, p)| OrderedPart::new(p, if i % 2 == 0 { 0.0 } else { 90.0 }))
            .collect();

        let sequential = NfpCache::new();
        PairScheduler::new(&engine, &sequential)
            .generate(&parts)
            .unwrap();
        let parallel = NfpCache::new();
        PairScheduler::new(&engine, &parallel)
            .with_parallel(true)
            .generate(&parts)
            .unwrap();

        assert_eq!(sequential.len(), 15);
        assert_eq!(parallel.len(), 15);
        for pair in PairScheduler::new(&engine, &NfpCache::new()).pending_pairs(&parts) {
            let s = sequential.get(&pair.key).unwrap().flatten();
            let p = parallel.get(&pair.key).unwrap().flatten();
            assert_eq!(s, p);
        }
    }
}
