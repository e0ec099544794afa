//! Benchmarks for the scoring path and the test-tier kernels.

use corebench::kernels::{BuiltinKernel, Kernel, KernelContext};
use corebench::models::{BenchmarkResult, DeviceTier, KernelId, KernelMode};
use corebench::{geometric_mean, params_for, ScoringConfig, ScoringEngine};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

fn reference_results(config: &ScoringConfig, mode: KernelMode) -> Vec<BenchmarkResult> {
    KernelId::ALL
        .iter()
        .map(|&id| {
            let ops = config.reference.baseline(mode, id).unwrap_or(1.0) * 1.1;
            BenchmarkResult::measured(id, mode, Duration::from_secs(1), ops, true, serde_json::Value::Null)
        })
        .collect()
}

fn bench_geometric_mean(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometric_mean");

    for size in [10, 100, 1000].iter() {
        let ratios: Vec<f64> = (1..=*size).map(|i| 0.5 + (i % 7) as f64 * 0.25).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| geometric_mean(black_box(&ratios)));
        });
    }

    group.finish();
}

fn bench_summarize(c: &mut Criterion) {
    let config = ScoringConfig::builtin().unwrap();
    let single = reference_results(&config, KernelMode::Single);
    let multi = reference_results(&config, KernelMode::Multi);
    let engine = ScoringEngine::new(config);

    c.bench_function("summarize_full_battery", |b| {
        b.iter(|| engine.summarize(black_box(&single), black_box(&multi)));
    });
}

fn bench_test_tier_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("test_tier_single_core");
    group.sample_size(10);
    let params = params_for(DeviceTier::Test);
    let ctx = KernelContext::single();

    for id in KernelId::ALL {
        let kernel = BuiltinKernel::new(id, KernelMode::Single);
        group.bench_with_input(BenchmarkId::from_parameter(id.key()), &id, |b, _| {
            b.iter(|| kernel.run(black_box(&params), &ctx).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_geometric_mean, bench_summarize, bench_test_tier_kernels);
criterion_main!(benches);
