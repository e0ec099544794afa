//! Workload calibration: static per-tier parameter tables.
//!
//! Every kernel gets an independent size so that, at the tier's assumed
//! performance envelope, one invocation lands roughly in the 1-5 second band.
//! The tables are fixed lookups. Nothing here measures the host or re-tunes
//! parameters during a run.

use crate::error::KernelError;
use crate::models::DeviceTier;
use serde::{Deserialize, Serialize};

/// Seed for every generated kernel input, so runs see identical data.
pub const WORKLOAD_SEED: u64 = 0x00C0_4EBE_7C4A_2025;

/// Kernel-specific sizes and iteration counts for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadParams {
    pub tier: DeviceTier,
    /// Upper bound (exclusive) of the prime sieve
    pub prime_range: u64,
    /// Inclusive range of n evaluated with naive recursion
    pub fibonacci_n_range: (u32, u32),
    /// Side length of the square matrices
    pub matrix_size: usize,
    pub hash_data_kb: usize,
    pub string_count: usize,
    pub ray_marching_resolution: (u32, u32),
    pub ray_marching_max_steps: u32,
    pub compression_data_kb: usize,
    pub monte_carlo_samples: u64,
    pub json_data_kb: usize,
    pub nqueens_size: u32,
    pub seed: u64,
}

/// Parameter set for `tier`. Deterministic: equal tiers give equal params.
pub fn params_for(tier: DeviceTier) -> WorkloadParams {
    match tier {
        DeviceTier::Slow => WorkloadParams {
            tier,
            prime_range: 1_000_000,
            fibonacci_n_range: (30, 38),
            matrix_size: 500,
            hash_data_kb: 25 * 1024,
            string_count: 250_000,
            ray_marching_resolution: (256, 256),
            ray_marching_max_steps: 64,
            compression_data_kb: 25 * 1024,
            monte_carlo_samples: 25_000_000,
            json_data_kb: 2 * 1024,
            nqueens_size: 12,
            seed: WORKLOAD_SEED,
        },
        DeviceTier::Mid => WorkloadParams {
            tier,
            prime_range: 6_000_000,
            fibonacci_n_range: (32, 38),
            matrix_size: 600,
            hash_data_kb: 40 * 1024,
            string_count: 500_000,
            ray_marching_resolution: (300, 300),
            ray_marching_max_steps: 96,
            compression_data_kb: 25 * 1024,
            monte_carlo_samples: 40_000_000,
            json_data_kb: 4 * 1024,
            nqueens_size: 13,
            seed: WORKLOAD_SEED,
        },
        DeviceTier::Flagship => WorkloadParams {
            tier,
            prime_range: 20_000_000,
            fibonacci_n_range: (35, 42),
            matrix_size: 1000,
            hash_data_kb: 100 * 1024,
            string_count: 1_250_000,
            ray_marching_resolution: (500, 500),
            ray_marching_max_steps: 128,
            compression_data_kb: 60 * 1024,
            monte_carlo_samples: 120_000_000,
            json_data_kb: 10 * 1024,
            nqueens_size: 14,
            seed: WORKLOAD_SEED,
        },
        // Warm-up only; never scored.
        DeviceTier::Test => WorkloadParams {
            tier,
            prime_range: 50_000,
            fibonacci_n_range: (15, 20),
            matrix_size: 64,
            hash_data_kb: 256,
            string_count: 5_000,
            ray_marching_resolution: (32, 32),
            ray_marching_max_steps: 16,
            compression_data_kb: 256,
            monte_carlo_samples: 200_000,
            json_data_kb: 64,
            nqueens_size: 8,
            seed: WORKLOAD_SEED,
        },
    }
}

impl WorkloadParams {
    /// Reject parameter sets no kernel can run with.
    pub fn validate(&self) -> Result<(), KernelError> {
        let (fib_lo, fib_hi) = self.fibonacci_n_range;
        let (width, height) = self.ray_marching_resolution;

        let problems: Vec<&str> = [
            (self.prime_range < 2, "prime_range must be at least 2"),
            (fib_lo > fib_hi, "fibonacci_n_range is inverted"),
            (fib_hi > 60, "fibonacci_n_range upper bound exceeds 60"),
            (self.matrix_size == 0, "matrix_size must be positive"),
            (self.hash_data_kb == 0, "hash_data_kb must be positive"),
            (self.string_count == 0, "string_count must be positive"),
            (width == 0 || height == 0, "ray_marching_resolution must be positive"),
            (self.ray_marching_max_steps == 0, "ray_marching_max_steps must be positive"),
            (self.compression_data_kb == 0, "compression_data_kb must be positive"),
            (self.monte_carlo_samples == 0, "monte_carlo_samples must be positive"),
            (self.json_data_kb == 0, "json_data_kb must be positive"),
            (self.nqueens_size == 0 || self.nqueens_size > 20, "nqueens_size must be in 1..=20"),
        ]
        .into_iter()
        .filter_map(|(bad, msg)| bad.then_some(msg))
        .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(KernelError::InvalidParams(problems.join("; ")))
        }
    }
}
