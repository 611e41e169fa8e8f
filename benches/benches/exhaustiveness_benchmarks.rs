//! Exhaustiveness Checker Performance Benchmarks
//!
//! This module benchmarks the pattern exhaustiveness engine:
//! - Sealed hierarchy coverage as the number of permitted classes grows
//! - Record pattern reduction over component grids
//! - Missing branch synthesis
//! - Cold versus warm memoization caches

use covera_benchmarks::{class_type, leaf_labels, pair_diagonal, pair_grid, sealed_universe};
use covera_patterns::{
    check_exhaustiveness, CoverageContext, ExhaustivenessCache, ExhaustivenessConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

// ============================================================================
// Sealed Hierarchies
// ============================================================================

fn bench_sealed_hierarchies(c: &mut Criterion) {
    let mut group = c.benchmark_group("sealed_hierarchy");
    let config = ExhaustivenessConfig::default();

    for width in [4, 16, 64] {
        let universe = sealed_universe(width);
        let shape = class_type(&universe, "Shape");
        let complete = leaf_labels(&universe, width, 0);
        let partial = leaf_labels(&universe, width, 1);
        group.throughput(Throughput::Elements(width as u64));

        group.bench_with_input(BenchmarkId::new("exhaustive", width), &complete, |b, labels| {
            b.iter(|| {
                let cache = ExhaustivenessCache::new();
                let ctx = CoverageContext::new(&universe, &config, &cache);
                black_box(check_exhaustiveness(&ctx, &shape, black_box(labels)))
            })
        });

        group.bench_with_input(BenchmarkId::new("one_missing", width), &partial, |b, labels| {
            b.iter(|| {
                let cache = ExhaustivenessCache::new();
                let ctx = CoverageContext::new(&universe, &config, &cache);
                black_box(check_exhaustiveness(&ctx, &shape, black_box(labels)))
            })
        });
    }

    group.finish();
}

// ============================================================================
// Record Patterns
// ============================================================================

fn bench_record_grids(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_grid");
    let config = ExhaustivenessConfig::default();

    for width in [2, 4, 6] {
        let universe = sealed_universe(width);
        let pair = class_type(&universe, "Pair");
        let grid = pair_grid(&universe, width);
        group.throughput(Throughput::Elements(grid.len() as u64));

        group.bench_with_input(BenchmarkId::new("cold_cache", width), &grid, |b, labels| {
            b.iter(|| {
                let cache = ExhaustivenessCache::new();
                let ctx = CoverageContext::new(&universe, &config, &cache);
                black_box(check_exhaustiveness(&ctx, &pair, black_box(labels)))
            })
        });

        // One shared cache: every iteration after the first is a memo hit.
        let cache = ExhaustivenessCache::new();
        group.bench_with_input(BenchmarkId::new("warm_cache", width), &grid, |b, labels| {
            b.iter(|| {
                let ctx = CoverageContext::new(&universe, &config, &cache);
                black_box(check_exhaustiveness(&ctx, &pair, black_box(labels)))
            })
        });
    }

    group.finish();
}

// ============================================================================
// Missing Branch Synthesis
// ============================================================================

fn bench_missing_branches(c: &mut Criterion) {
    let mut group = c.benchmark_group("missing_branches");
    let config = ExhaustivenessConfig::default();

    for width in [2, 3, 4] {
        let universe = sealed_universe(width);
        let pair = class_type(&universe, "Pair");
        let diagonal = pair_diagonal(&universe, width);

        group.bench_with_input(BenchmarkId::new("diagonal", width), &diagonal, |b, labels| {
            b.iter(|| {
                let cache = ExhaustivenessCache::new();
                let ctx = CoverageContext::new(&universe, &config, &cache);
                black_box(check_exhaustiveness(&ctx, &pair, black_box(labels)))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sealed_hierarchies,
    bench_record_grids,
    bench_missing_branches
);
criterion_main!(benches);
