//! Benchmarks for NFP generation and placement.
//!
//! Measures both Minkowski backends, cold versus warm cache lookups and a full
//! placement pass at a few instance sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sheetnest_d2::{
    prepare, Config, MinkowskiBackend, NfpCache, NfpEngine, NfpMode, OrderedPart, PairScheduler,
    PlacementWorker, Polygon, ScalingConfig, Sheet,
};

fn bench_nfp_backends(c: &mut Criterion) {
    let mut group = c.benchmark_group("nfp_outer");
    let a = Polygon::l_shape(60.0, 40.0, 20.0, 15.0);
    let b = Polygon::l_shape(30.0, 30.0, 10.0, 10.0);

    for backend in [MinkowskiBackend::Fallback, MinkowskiBackend::Accelerated] {
        let engine = NfpEngine::new(backend, ScalingConfig::default());
        group.bench_function(BenchmarkId::new("l_shapes", format!("{:?}", backend)), |bench| {
            bench.iter(|| {
                engine
                    .calculate_nfp(black_box(&a), black_box(&b), 0.0, 90.0, NfpMode::Outer)
                    .ok()
            })
        });
    }
    group.finish();
}

fn bench_inner_nfp(c: &mut Criterion) {
    let engine = NfpEngine::new(MinkowskiBackend::Fallback, ScalingConfig::default());
    let sheet = Sheet::rectangle(3000.0, 1500.0).polygon;
    let part = Polygon::l_shape(250.0, 220.0, 100.0, 80.0);

    c.bench_function("nfp_inner_rectangle_sheet", |bench| {
        bench.iter(|| {
            engine
                .calculate_nfp(black_box(&sheet), black_box(&part), 0.0, 90.0, NfpMode::Inner)
                .ok()
        })
    });
}

fn mixed_parts(n: usize) -> Vec<Polygon> {
    (0..n)
        .map(|i| {
            let w = 20.0 + (i as f64 * 3.0) % 30.0;
            let h = 15.0 + (i as f64 * 7.0) % 25.0;
            if i % 3 == 0 {
                Polygon::l_shape(w + 10.0, h + 10.0, w / 2.0, h / 2.0)
            } else {
                Polygon::rectangle(w, h)
            }
        })
        .collect()
}

fn bench_placement(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement");
    group.sample_size(10);

    for &n in &[5, 10, 20] {
        let config = Config::new();
        let nest = match prepare(&mixed_parts(n), &[Sheet::rectangle(200.0, 200.0)], &config) {
            Ok(nest) => nest,
            Err(_) => continue,
        };
        let engine = NfpEngine::new(MinkowskiBackend::Fallback, ScalingConfig::default());
        let ordered: Vec<OrderedPart> = nest
            .parts
            .iter()
            .enumerate()
            .map(|(i, p)| OrderedPart::new(p, (i % 4) as f64 * 90.0))
            .collect();

        group.bench_with_input(BenchmarkId::new("cold_cache", n), &ordered, |bench, parts| {
            bench.iter(|| {
                let cache = NfpCache::new();
                let _ = PairScheduler::new(&engine, &cache).generate(parts);
                PlacementWorker::new(&engine, &cache, &config)
                    .place_parts(black_box(parts), &nest.sheets)
                    .ok()
            })
        });

        let warm = NfpCache::new();
        let _ = PairScheduler::new(&engine, &warm).generate(&ordered);
        group.bench_with_input(BenchmarkId::new("warm_cache", n), &ordered, |bench, parts| {
            bench.iter(|| {
                PlacementWorker::new(&engine, &warm, &config)
                    .place_parts(black_box(parts), &nest.sheets)
                    .ok()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_nfp_backends, bench_inner_nfp, bench_placement);
criterion_main!(benches);
