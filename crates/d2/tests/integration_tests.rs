//! Integration tests for sheetnest-d2.

use sheetnest_core::{Gene, GeneticController, NestResult, PartPlacement, SheetPlacement};
use sheetnest_core::{TopNestResults, Turnover};
use sheetnest_d2::clipping::{self, Shape};
use sheetnest_d2::{
    prepare, Bounds, Config, IterationOutcome, MinkowskiBackend, NestingContext, NfpCache,
    NfpEngine, NfpKey, NfpMode, OrderedPart, PairScheduler, PlacementType, PlacementWorker,
    Polygon, ScalingConfig, Sheet,
};

fn footprint(width: f64, height: f64, rotation: f64, x: f64, y: f64) -> Bounds {
    Polygon::rectangle(width, height)
        .rotated(rotation)
        .bounds()
        .unwrap()
        .translated(x, y)
}

fn overlaps(a: &Bounds, b: &Bounds) -> bool {
    let eps = 1e-6;
    a.max_x > b.min_x + eps
        && b.max_x > a.min_x + eps
        && a.max_y > b.min_y + eps
        && b.max_y > a.min_y + eps
}

fn frame(size: f64, wall: f64) -> Polygon {
    Polygon::rectangle(size, size).with_hole(vec![
        (wall, wall),
        (wall, size - wall),
        (size - wall, size - wall),
        (size - wall, wall),
    ])
}

mod scenario_tests {
    use super::*;

    #[test]
    fn test_two_rectangles_bounding_box() {
        let config = Config::new()
            .with_placement_type(PlacementType::BoundingBox)
            .with_population_size(4)
            .with_elite_count(1)
            .with_seed(3);
        let mut ctx = NestingContext::new(
            vec![Polygon::rectangle(250.0, 220.0).with_quantity(2)],
            vec![Sheet::rectangle(3000.0, 1500.0)],
            config,
        );
        ctx.start().unwrap();
        ctx.iterate().unwrap();

        let best = ctx.current_best().unwrap().unwrap();
        assert!(best.all_placed());
        assert_eq!(best.used_sheet_count(), 1);
        assert!(best.utilization > 0.0);

        let p = &best.sheets[0].placements;
        assert_eq!(p.len(), 2);
        let a = footprint(250.0, 220.0, p[0].rotation, p[0].x, p[0].y);
        let b = footprint(250.0, 220.0, p[1].rotation, p[1].x, p[1].y);
        assert!(!overlaps(&a, &b));
        for f in [a, b] {
            assert!(f.min_x >= -1e-6 && f.min_y >= -1e-6);
            assert!(f.max_x <= 3000.0 + 1e-6 && f.max_y <= 1500.0 + 1e-6);
        }
    }

    #[test]
    fn test_oversized_part_is_unplaced() {
        let config = Config::new().with_population_size(3).with_seed(5);
        let mut ctx = NestingContext::new(
            vec![
                Polygon::rectangle(3500.0, 1600.0),
                Polygon::rectangle(100.0, 100.0),
            ],
            vec![Sheet::rectangle(3000.0, 1500.0)],
            config,
        );
        ctx.start().unwrap();
        let outcome = ctx.iterate().unwrap();
        assert!(matches!(outcome, IterationOutcome::Evaluated { .. }));

        let best = ctx.current_best().unwrap().unwrap();
        assert_eq!(best.unplaced.len(), 1);
        assert_eq!(best.unplaced[0].source, 0);
        assert_eq!(best.total_placed_count(), 1);
        assert!(!ctx.stats().errored);

        let layout = ctx.assign_placement().unwrap().unwrap();
        let missing: Vec<_> = layout.unplaced().collect();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].position.is_none());
    }

    #[test]
    fn test_sample_grid_fills_sheet() {
        let config = Config::new()
            .with_placement_type(PlacementType::Gravity)
            .with_rotations(1)
            .with_population_size(2)
            .with_elite_count(1)
            .with_parallel(false)
            .with_seed(11);
        let mut ctx = NestingContext::new(
            vec![Polygon::rectangle(250.0, 220.0).with_quantity(12)],
            vec![Sheet::rectangle(1000.0, 660.0)],
            config,
        );
        ctx.start().unwrap();
        ctx.iterate().unwrap();

        // 4 x 3 rectangles cover the sheet exactly.
        let best = ctx.current_best().unwrap().unwrap();
        assert!(best.all_placed());
        assert!((best.utilization - 1.0).abs() < 1e-9);
    }
}

mod nfp_tests {
    use super::*;

    fn engine() -> NfpEngine {
        NfpEngine::new(MinkowskiBackend::Fallback, ScalingConfig::default())
    }

    #[test]
    fn test_nfp_deterministic_cold_and_warm() {
        let engine = engine();
        let mut a = Polygon::l_shape(60.0, 40.0, 20.0, 15.0);
        a.source = 0;
        let mut b = frame(30.0, 5.0);
        b.source = 1;

        let first = engine
            .calculate_nfp(&a, &b, 90.0, 180.0, NfpMode::Outer)
            .unwrap();
        let second = engine
            .calculate_nfp(&a, &b, 90.0, 180.0, NfpMode::Outer)
            .unwrap();
        assert_eq!(first, second);

        let cache = NfpCache::new();
        let key = NfpKey::new(0, 1, 90.0, 180.0, NfpMode::Outer);
        let cold = cache
            .get_or_compute(key, || engine.calculate_nfp(&a, &b, 90.0, 180.0, NfpMode::Outer))
            .unwrap()
            .unwrap();
        let warm = cache.get(&key).unwrap().flatten().unwrap();
        assert_eq!(*cold, first);
        assert_eq!(*warm, first);
    }

    #[test]
    fn test_backends_agree() {
        let a = Polygon::l_shape(60.0, 40.0, 20.0, 15.0);
        let b = Polygon::l_shape(30.0, 30.0, 10.0, 10.0);
        let scaling = ScalingConfig::default();
        let fallback = NfpEngine::new(MinkowskiBackend::Fallback, scaling)
            .calculate_nfp(&a, &b, 0.0, 90.0, NfpMode::Outer)
            .unwrap();
        let accelerated = NfpEngine::new(MinkowskiBackend::Accelerated, scaling)
            .calculate_nfp(&a, &b, 0.0, 90.0, NfpMode::Outer)
            .unwrap();
        assert!((fallback.area() - accelerated.area()).abs() < 1e-6);
    }

    #[test]
    fn test_cache_idempotence() {
        let engine = engine();
        let cache = NfpCache::new();
        let mut a = Polygon::rectangle(10.0, 10.0);
        a.source = 0;
        let mut b = Polygon::rectangle(4.0, 4.0);
        b.source = 1;
        let key = NfpKey::new(0, 1, 0.0, 0.0, NfpMode::Outer);

        let stored = cache
            .get_or_compute(key, || engine.calculate_nfp(&a, &b, 0.0, 0.0, NfpMode::Outer))
            .unwrap();
        let other = engine
            .calculate_nfp(&a, &b, 0.0, 90.0, NfpMode::Outer)
            .unwrap();
        let kept = cache.insert(key, Some(std::sync::Arc::new(other))).unwrap();
        assert_eq!(kept, stored);

        for _ in 0..3 {
            cache
                .get_or_compute(key, || panic!("cached key recomputed"))
                .unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.entries, 1);
    }
}

mod placement_tests {
    use super::*;

    #[test]
    fn test_placement_deterministic_from_cold_cache() {
        let parts = vec![
            Polygon::rectangle(120.0, 80.0).with_quantity(3),
            Polygon::l_shape(100.0, 90.0, 40.0, 40.0).with_quantity(2),
            frame(90.0, 10.0),
            Polygon::rectangle(30.0, 30.0).with_quantity(2),
        ];
        let sheets = vec![Sheet::rectangle(400.0, 300.0).with_quantity(2)];
        let config = Config::new().with_placement_type(PlacementType::BottomLeft);
        let nest = prepare(&parts, &sheets, &config).unwrap();
        let engine = NfpEngine::new(MinkowskiBackend::Fallback, ScalingConfig::default());

        let rotations = [0.0, 90.0, 180.0, 270.0];
        let ordered: Vec<OrderedPart> = nest
            .parts
            .iter()
            .enumerate()
            .map(|(i, p)| OrderedPart::new(p, rotations[i % 4]))
            .collect();

        let run = || {
            let cache = NfpCache::new();
            PairScheduler::new(&engine, &cache)
                .with_parallel(true)
                .generate(&ordered)
                .unwrap();
            PlacementWorker::new(&engine, &cache, &config)
                .place_parts(&ordered, &nest.sheets)
                .unwrap()
        };

        let first = run();
        let second = run();
        assert_eq!(first.sheets.len(), second.sheets.len());
        for ((_, a), (_, b)) in first.placements().zip(second.placements()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.x.to_bits(), b.x.to_bits());
            assert_eq!(a.y.to_bits(), b.y.to_bits());
            assert_eq!(a.rotation.to_bits(), b.rotation.to_bits());
        }
        assert_eq!(first.unplaced, second.unplaced);
        assert_eq!(first.fitness.to_bits(), second.fitness.to_bits());
    }

    fn placed_rings(part: &Polygon, placement: &PartPlacement) -> Vec<Vec<(f64, f64)>> {
        let placed = part
            .rotated(placement.rotation)
            .shifted(placement.x, placement.y);
        std::iter::once(placed.points().to_vec())
            .chain(placed.children.iter().map(|c| c.points().to_vec()))
            .collect()
    }

    fn area(shapes: &[Shape]) -> f64 {
        shapes.iter().map(Shape::area).sum()
    }

    #[test]
    fn test_rotated_parts_never_overlap() {
        let triangle = Polygon::new(vec![(0.0, 0.0), (50.0, 0.0), (25.0, 40.0)]);
        let parts = vec![
            frame(100.0, 15.0).with_quantity(2),
            triangle.with_quantity(3),
            Polygon::rectangle(30.0, 20.0).with_quantity(3),
            Polygon::l_shape(60.0, 60.0, 30.0, 30.0).with_quantity(2),
        ];
        let config = Config::new()
            .with_placement_type(PlacementType::BoundingBox)
            .with_rotations(6)
            .with_population_size(4)
            .with_elite_count(1)
            .with_seed(11);
        let mut ctx = NestingContext::new(parts, vec![Sheet::rectangle(400.0, 300.0)], config);
        ctx.start().unwrap();
        ctx.iterate().unwrap();
        ctx.iterate().unwrap();

        let scaling = ScalingConfig::default();
        let sheet = vec![Polygon::rectangle(400.0, 300.0).points().to_vec()];
        let nest = ctx.nest().unwrap();
        let results = ctx.top_results().unwrap();
        assert!(!results.is_empty());

        for result in &results {
            for sheet_placement in &result.sheets {
                let regions: Vec<Vec<Vec<(f64, f64)>>> = sheet_placement
                    .placements
                    .iter()
                    .map(|p| placed_rings(nest.parts.get(p.id).unwrap(), p))
                    .collect();

                for region in &regions {
                    let outside = area(&clipping::difference(region, &sheet, &scaling));
                    assert!(outside < 1e-2, "part leaves the sheet by {}", outside);
                }
                for i in 0..regions.len() {
                    let whole = area(&clipping::union_all(&regions[i], &scaling));
                    for j in (i + 1)..regions.len() {
                        let rest = area(&clipping::difference(&regions[i], &regions[j], &scaling));
                        let shared = whole - rest;
                        assert!(
                            shared < 1e-2,
                            "parts {} and {} overlap by {}",
                            sheet_placement.placements[i].id,
                            sheet_placement.placements[j].id,
                            shared
                        );
                    }
                }
            }
        }
    }
}

mod ranking_tests {
    use super::*;
    use std::collections::HashSet;

    fn result(fitness: f64, x: f64) -> NestResult {
        let mut sheet = SheetPlacement::new(0, 0, 100.0);
        sheet.placements.push(PartPlacement {
            id: 0,
            source: 0,
            x,
            y: 0.0,
            rotation: 0.0,
            order: 0,
        });
        let mut result = NestResult::new();
        result.sheets.push(sheet);
        result.fitness = fitness;
        result
    }

    #[test]
    fn test_ranking_properties() {
        let capacity = 5;
        let elite_count = 2;
        let store = TopNestResults::new(capacity, elite_count);
        let mut offered: Vec<f64> = Vec::new();

        for i in 0..60u32 {
            let fitness = ((i * 37) % 101) as f64;
            // Every third result repeats an earlier layout.
            let x = if i % 3 == 2 { (i - 1) as f64 } else { i as f64 };
            let outcome = store.try_add(result(fitness, x)).unwrap();
            if outcome.is_added() {
                offered.push(fitness);
            }

            let items = store.snapshot().unwrap();
            assert!(items.len() <= capacity);
            assert!(items.windows(2).all(|w| w[0].fitness <= w[1].fitness));

            let signatures: HashSet<_> = items.iter().map(|r| r.signature()).collect();
            assert_eq!(signatures.len(), items.len());

            // The elite range holds the best results accepted so far.
            let mut best: Vec<f64> = offered.clone();
            best.sort_by(f64::total_cmp);
            let elites: Vec<f64> = store.elites().unwrap().iter().map(|r| r.fitness).collect();
            assert_eq!(elites, best[..elites.len()].to_vec());
        }
    }
}

mod ga_tests {
    use super::*;

    #[test]
    fn test_turnover_keeps_size_and_elites() {
        let genes: Vec<Gene> = (0..6)
            .map(|i| Gene::new(i, 10.0 * (i + 1) as f64, vec![0.0, 90.0]))
            .collect();
        let config = Config::new()
            .with_population_size(8)
            .with_elite_count(2)
            .with_seed(17);
        let mut controller = GeneticController::new(genes, &config).unwrap();

        for (i, c) in controller.population_mut().iter_mut().enumerate() {
            assert!(c.begin_processing());
            c.set_evaluated(100.0 - i as f64);
        }
        let mut ranked: Vec<_> = controller.population().to_vec();
        ranked.sort_by(|a, b| a.fitness().unwrap().total_cmp(&b.fitness().unwrap()));

        let turnover = controller.generate().unwrap();
        assert!(matches!(turnover, Turnover::NextGeneration { generation: 1, .. }));
        let population = controller.population();
        assert_eq!(population.len(), 8);
        assert!(population.iter().all(|c| c.is_pending()));
        for (survivor, elite) in population.iter().zip(&ranked[..2]) {
            assert_eq!(survivor.order, elite.order);
            assert_eq!(survivor.rotations, elite.rotations);
        }
    }
}

mod lifecycle_tests {
    use super::*;
    use sheetnest_core::{ProgressEvent, ProgressSink};
    use std::sync::mpsc;

    #[test]
    fn test_stop_from_another_thread() {
        let mut ctx = NestingContext::new(
            vec![Polygon::rectangle(50.0, 40.0).with_quantity(10)],
            vec![Sheet::rectangle(500.0, 500.0)],
            Config::new().with_seed(2),
        );
        ctx.start().unwrap();

        let handle = ctx.stop_handle();
        std::thread::spawn(move || handle.stop()).join().unwrap();

        assert!(ctx.is_stopped());
        assert_eq!(ctx.iterate().unwrap(), IterationOutcome::Stopped);
        assert_eq!(ctx.stats().nest_count, 0);
    }

    #[test]
    fn test_stagnation_ends_the_search() {
        let (tx, rx) = mpsc::channel();
        // One part with one rotation: every child repeats the first nest.
        let config = Config::new()
            .with_rotations(1)
            .with_population_size(3)
            .with_elite_count(1)
            .with_seed(9);
        let mut ctx = NestingContext::new(
            vec![Polygon::rectangle(10.0, 10.0)],
            vec![Sheet::rectangle(100.0, 100.0)],
            config,
        )
        .with_progress(ProgressSink::Channel(tx));
        ctx.start().unwrap();

        assert!(matches!(
            ctx.iterate().unwrap(),
            IterationOutcome::Evaluated { complete: true, .. }
        ));
        assert_eq!(ctx.iterate().unwrap(), IterationOutcome::Stagnated);
        assert_eq!(ctx.iterate().unwrap(), IterationOutcome::Stagnated);
        assert!(ctx.current_best().unwrap().is_some());

        let stagnated = rx.try_iter().any(|e| {
            matches!(e, ProgressEvent::Message(ref text)
                if text == "recalculating the same nests over and over")
        });
        assert!(stagnated);
    }

    #[test]
    fn test_rejected_duplicates_are_counted() {
        let config = Config::new()
            .with_rotations(1)
            .with_population_size(4)
            .with_elite_count(1)
            .with_seed(4);
        let mut ctx = NestingContext::new(
            vec![Polygon::rectangle(10.0, 10.0)],
            vec![Sheet::rectangle(100.0, 100.0)],
            config,
        );
        ctx.start().unwrap();
        ctx.iterate().unwrap();

        // Four identical layouts: one kept, three duplicates.
        assert_eq!(ctx.top_results().unwrap().len(), 1);
        assert_eq!(ctx.stats().rejected, 3);
    }
}
