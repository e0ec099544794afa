//! Kernel contract and the built-in workload roster.
//!
//! A kernel is a pure function of its `WorkloadParams`: it generates its own
//! input from the parameter seed, times only its hot loop, checks its own
//! output and reports throughput. Multi-core variants fan out through the
//! `WorkerPool` carried by `KernelContext`; single-core variants ignore it.

mod data;
mod numeric;
mod render;

use crate::calibration::WorkloadParams;
use crate::error::KernelError;
use crate::models::{result_name, BenchmarkResult, KernelId, KernelMode};
use crate::orchestrator::pool::WorkerPool;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One CPU-bound workload in one execution mode.
pub trait Kernel: Send + Sync {
    fn id(&self) -> KernelId;

    fn mode(&self) -> KernelMode;

    fn name(&self) -> String {
        result_name(self.id(), self.mode())
    }

    /// Run once. Must not touch process-wide state other than CPU time.
    fn run(&self, params: &WorkloadParams, ctx: &KernelContext) -> Result<BenchmarkResult, KernelError>;
}

/// Execution resources handed to a kernel invocation.
#[derive(Clone)]
pub struct KernelContext {
    pool: Option<Arc<WorkerPool>>,
}

impl KernelContext {
    /// Context for single-core kernels: no pool, everything runs inline.
    pub fn single() -> Self {
        KernelContext { pool: None }
    }

    pub fn multi(pool: Arc<WorkerPool>) -> Self {
        KernelContext { pool: Some(pool) }
    }

    /// Number of workers a multi-core kernel should split its input across.
    pub fn parallelism(&self) -> usize {
        self.pool.as_ref().map(|p| p.size()).unwrap_or(1)
    }

    /// Run `tasks` on the pool, or inline in order when there is no pool.
    pub fn scatter<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, KernelError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match &self.pool {
            Some(pool) => pool.scatter(tasks),
            None => Ok(tasks.into_iter().map(|task| task()).collect()),
        }
    }
}

/// What a kernel body reports back before it becomes a `BenchmarkResult`.
pub(crate) struct Measurement {
    pub elapsed: Duration,
    pub operations: f64,
    pub metrics: serde_json::Value,
}

/// Time `f`, which must contain nothing but the measured work.
pub(crate) fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

/// Split `0..total` into at most `shards` contiguous, non-empty ranges.
pub fn shard_ranges(total: usize, shards: usize) -> Vec<Range<usize>> {
    let shards = shards.clamp(1, total.max(1));
    let base = total / shards;
    let extra = total % shards;

    let mut ranges = Vec::with_capacity(shards);
    let mut start = 0;
    for i in 0..shards {
        let len = base + usize::from(i < extra);
        if len == 0 {
            continue;
        }
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// The reference implementation of each `KernelId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinKernel {
    id: KernelId,
    mode: KernelMode,
}

impl BuiltinKernel {
    pub fn new(id: KernelId, mode: KernelMode) -> Self {
        BuiltinKernel { id, mode }
    }
}

impl Kernel for BuiltinKernel {
    fn id(&self) -> KernelId {
        self.id
    }

    fn mode(&self) -> KernelMode {
        self.mode
    }

    fn run(&self, params: &WorkloadParams, ctx: &KernelContext) -> Result<BenchmarkResult, KernelError> {
        params.validate()?;
        let multi = self.mode == KernelMode::Multi;

        let measurement = match self.id {
            KernelId::PrimeGeneration => numeric::prime_generation(params, ctx, multi)?,
            KernelId::Fibonacci => numeric::fibonacci(params, ctx, multi)?,
            KernelId::MatrixMultiplication => numeric::matrix_multiplication(params, ctx, multi)?,
            KernelId::HashComputing => data::hash_computing(params, ctx, multi)?,
            KernelId::StringSorting => data::string_sorting(params, ctx, multi)?,
            KernelId::RayMarching => render::ray_marching(params, ctx, multi)?,
            KernelId::Compression => data::compression(params, ctx, multi)?,
            KernelId::MonteCarloPi => numeric::monte_carlo_pi(params, ctx, multi)?,
            KernelId::JsonParsing => data::json_parsing(params, ctx, multi)?,
            KernelId::NQueens => numeric::nqueens(params, ctx, multi)?,
        };

        Ok(BenchmarkResult::measured(
            self.id,
            self.mode,
            measurement.elapsed,
            measurement.operations,
            true,
            measurement.metrics,
        ))
    }
}

/// The fixed battery for one mode, in roster order.
pub fn builtin_roster(mode: KernelMode) -> Vec<Arc<dyn Kernel>> {
    KernelId::ALL
        .iter()
        .map(|&id| Arc::new(BuiltinKernel::new(id, mode)) as Arc<dyn Kernel>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::params_for;
    use crate::models::DeviceTier;

    #[test]
    fn test_shard_ranges_cover_everything() {
        let ranges = shard_ranges(10, 3);
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);

        let ranges = shard_ranges(2, 8);
        assert_eq!(ranges, vec![0..1, 1..2]);

        assert_eq!(shard_ranges(0, 4), Vec::<Range<usize>>::new());
    }

    #[test]
    fn test_roster_order_matches_kernel_ids() {
        let roster = builtin_roster(KernelMode::Multi);
        let ids: Vec<KernelId> = roster.iter().map(|k| k.id()).collect();
        assert_eq!(ids, KernelId::ALL.to_vec());
        assert!(roster.iter().all(|k| k.mode() == KernelMode::Multi));
        assert_eq!(roster[6].name(), "Multi-Core Compression");
    }

    #[test]
    fn test_every_builtin_runs_at_test_tier() {
        let params = params_for(DeviceTier::Test);
        let pool = Arc::new(WorkerPool::new(2).unwrap());
        for mode in [KernelMode::Single, KernelMode::Multi] {
            let ctx = match mode {
                KernelMode::Single => KernelContext::single(),
                KernelMode::Multi => KernelContext::multi(Arc::clone(&pool)),
            };
            for kernel in builtin_roster(mode) {
                let result = kernel
                    .run(&params, &ctx)
                    .unwrap_or_else(|e| panic!("{} failed: {}", kernel.name(), e));
                assert!(result.is_valid, "{} invalid", result.name);
                assert!(
                    result.ops_per_second.is_finite() && result.ops_per_second > 0.0,
                    "{} throughput {}",
                    result.name,
                    result.ops_per_second
                );
            }
        }
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let mut params = params_for(DeviceTier::Test);
        params.matrix_size = 0;
        let kernel = BuiltinKernel::new(KernelId::PrimeGeneration, KernelMode::Single);
        assert!(matches!(
            kernel.run(&params, &KernelContext::single()),
            Err(KernelError::InvalidParams(_))
        ));
    }
}
