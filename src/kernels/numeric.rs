//! Integer and floating-point kernels: primes, Fibonacci, matrices,
//! Monte Carlo π and N-Queens.

use super::{shard_ranges, timed, KernelContext, Measurement};
use crate::calibration::WorkloadParams;
use crate::error::KernelError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::hint::black_box;
use std::ops::Range;
use std::sync::Arc;

// ===== Prime generation =====

/// Primes up to `limit` inclusive, by plain sieve.
fn base_primes(limit: usize) -> Vec<usize> {
    let mut composite = vec![false; limit + 1];
    let mut primes = Vec::new();
    for i in 2..=limit {
        if !composite[i] {
            primes.push(i);
            let mut j = i * i;
            while j <= limit {
                composite[j] = true;
                j += i;
            }
        }
    }
    primes
}

/// Count primes in `range` using the supplied base primes.
fn sieve_segment(range: Range<usize>, base: &[usize]) -> u64 {
    let (lo, hi) = (range.start, range.end);
    let mut composite = vec![false; hi - lo];
    for &p in base {
        if p * p >= hi {
            break;
        }
        let first = (p * p).max(lo.div_ceil(p) * p);
        let mut m = first;
        while m < hi {
            composite[m - lo] = true;
            m += p;
        }
    }
    composite
        .iter()
        .enumerate()
        .filter(|&(i, &c)| !c && lo + i >= 2)
        .count() as u64
}

pub(super) fn prime_generation(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let n = params.prime_range as usize;
    let sqrt_n = (n as f64).sqrt() as usize + 1;

    let (count, elapsed) = if multi {
        let ranges = shard_ranges(n, ctx.parallelism());
        timed(|| -> Result<u64, KernelError> {
            let base = Arc::new(base_primes(sqrt_n));
            let tasks: Vec<_> = ranges
                .into_iter()
                .map(|range| {
                    let base = Arc::clone(&base);
                    move || sieve_segment(range, &base)
                })
                .collect();
            Ok(ctx.scatter(tasks)?.into_iter().sum())
        })
    } else {
        timed(|| -> Result<u64, KernelError> { Ok(sieve_segment(0..n, &base_primes(sqrt_n))) })
    };
    let count = count?;

    // Rosser-Schoenfeld bounds on pi(x), valid for x >= 17.
    let x = n as f64;
    if n >= 17 {
        let lower = x / x.ln();
        let upper = 1.25506 * x / x.ln();
        if (count as f64) < lower || (count as f64) > upper {
            return Err(KernelError::Verification(format!(
                "{} primes below {} is outside [{:.0}, {:.0}]",
                count, n, lower, upper
            )));
        }
    }

    Ok(Measurement {
        elapsed,
        operations: x * x.ln().ln(),
        metrics: json!({ "limit": n, "prime_count": count }),
    })
}

// ===== Fibonacci =====

fn fib_recursive(n: u32) -> u64 {
    if n < 2 {
        return n as u64;
    }
    fib_recursive(n - 1) + fib_recursive(n - 2)
}

fn fib_iterative(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a + b;
        a = b;
        b = next;
    }
    a
}

/// Number of calls naive recursion makes for `fib(n)`.
fn fib_call_count(n: u32) -> f64 {
    2.0 * fib_iterative(n + 1) as f64 - 1.0
}

fn fib_range(lo: u32, hi: u32) -> Vec<u64> {
    (lo..=hi).map(|n| fib_recursive(black_box(n))).collect()
}

pub(super) fn fibonacci(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let (lo, hi) = params.fibonacci_n_range;
    let expected: Vec<u64> = (lo..=hi).map(fib_iterative).collect();
    let calls_per_range: f64 = (lo..=hi).map(fib_call_count).sum();

    // Every worker evaluates the whole range; the range itself is too lopsided to split.
    let copies = if multi { ctx.parallelism() } else { 1 };
    let (outputs, elapsed) = timed(|| -> Result<Vec<Vec<u64>>, KernelError> {
        if multi {
            let tasks: Vec<_> = (0..copies).map(|_| move || fib_range(lo, hi)).collect();
            ctx.scatter(tasks)
        } else {
            Ok(vec![fib_range(lo, hi)])
        }
    });

    for output in outputs? {
        if output != expected {
            return Err(KernelError::Verification(
                "recursive Fibonacci disagrees with iterative reference".to_string(),
            ));
        }
    }

    Ok(Measurement {
        elapsed,
        operations: calls_per_range * copies as f64,
        metrics: json!({ "range": [lo, hi], "copies": copies, "fib_hi": expected.last() }),
    })
}

// ===== Matrix multiplication =====

fn random_matrix(rng: &mut StdRng, n: usize) -> Vec<f64> {
    (0..n * n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Rows `rows` of `a * b`, i-k-j order.
fn multiply_rows(a: &[f64], b: &[f64], n: usize, rows: Range<usize>) -> Vec<f64> {
    let mut c = vec![0.0; rows.len() * n];
    for (out_row, i) in rows.enumerate() {
        let c_row = &mut c[out_row * n..(out_row + 1) * n];
        for k in 0..n {
            let aik = a[i * n + k];
            let b_row = &b[k * n..(k + 1) * n];
            for (cij, bkj) in c_row.iter_mut().zip(b_row) {
                *cij += aik * bkj;
            }
        }
    }
    c
}

pub(super) fn matrix_multiplication(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let n = params.matrix_size;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let a = Arc::new(random_matrix(&mut rng, n));
    let b = Arc::new(random_matrix(&mut rng, n));

    let (c, elapsed) = if multi {
        let ranges = shard_ranges(n, ctx.parallelism());
        timed(|| -> Result<Vec<f64>, KernelError> {
            let tasks: Vec<_> = ranges
                .into_iter()
                .map(|rows| {
                    let (a, b) = (Arc::clone(&a), Arc::clone(&b));
                    move || multiply_rows(&a, &b, n, rows)
                })
                .collect();
            Ok(ctx.scatter(tasks)?.concat())
        })
    } else {
        timed(|| -> Result<Vec<f64>, KernelError> { Ok(multiply_rows(&a, &b, n, 0..n)) })
    };
    let c = c?;

    for (i, j) in [(0, 0), (n / 2, n - 1), (n - 1, n / 3)] {
        let direct: f64 = (0..n).map(|k| a[i * n + k] * b[k * n + j]).sum();
        if (direct - c[i * n + j]).abs() > 1e-9 * n as f64 {
            return Err(KernelError::Verification(format!(
                "C[{}][{}] = {} but expected {}",
                i,
                j,
                c[i * n + j],
                direct
            )));
        }
    }

    Ok(Measurement {
        elapsed,
        operations: 2.0 * (n as f64).powi(3),
        metrics: json!({ "matrix_size": n, "checksum": c.iter().sum::<f64>() }),
    })
}

// ===== Monte Carlo π =====

fn count_inside(seed: u64, samples: u64) -> u64 {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut inside = 0u64;
    for _ in 0..samples {
        let x: f64 = rng.gen();
        let y: f64 = rng.gen();
        if x * x + y * y <= 1.0 {
            inside += 1;
        }
    }
    inside
}

pub(super) fn monte_carlo_pi(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let samples = params.monte_carlo_samples;
    let seed = params.seed;

    let (inside, elapsed) = if multi {
        let ranges = shard_ranges(samples as usize, ctx.parallelism());
        timed(|| -> Result<u64, KernelError> {
            let tasks: Vec<_> = ranges
                .into_iter()
                .enumerate()
                .map(|(shard, range)| {
                    let shard_seed = seed.wrapping_add((shard as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                    move || count_inside(shard_seed, range.len() as u64)
                })
                .collect();
            Ok(ctx.scatter(tasks)?.into_iter().sum())
        })
    } else {
        timed(|| -> Result<u64, KernelError> { Ok(count_inside(seed, samples)) })
    };
    let inside = inside?;

    let estimate = 4.0 * inside as f64 / samples as f64;
    let error = (estimate - std::f64::consts::PI).abs();
    if error > 0.02 {
        return Err(KernelError::Verification(format!(
            "π estimate {:.5} is off by {:.5}",
            estimate, error
        )));
    }

    Ok(Measurement {
        elapsed,
        operations: samples as f64,
        metrics: json!({ "samples": samples, "pi_estimate": estimate, "error": error }),
    })
}

// ===== N-Queens =====

/// Solution counts for n = 1..=15.
const NQUEENS_SOLUTIONS: [u64; 15] = [
    1, 0, 0, 2, 10, 4, 40, 92, 352, 724, 2680, 14200, 73712, 365596, 2279184,
];

#[derive(Debug, Default, Clone, Copy)]
struct QueenStats {
    solutions: u64,
    nodes: u64,
}

fn place_queens(all: u32, cols: u32, left: u32, right: u32, stats: &mut QueenStats) {
    if cols == all {
        stats.solutions += 1;
        return;
    }
    let mut free = all & !(cols | left | right);
    while free != 0 {
        let bit = free & free.wrapping_neg();
        free ^= bit;
        stats.nodes += 1;
        place_queens(all, cols | bit, ((left | bit) << 1) & all, (right | bit) >> 1, stats);
    }
}

/// Search every board whose first-row queen sits in `column`.
fn solve_from_column(n: u32, column: u32) -> QueenStats {
    let all = (1u32 << n) - 1;
    let bit = 1u32 << column;
    let mut stats = QueenStats {
        solutions: 0,
        nodes: 1,
    };
    place_queens(all, bit, (bit << 1) & all, bit >> 1, &mut stats);
    stats
}

pub(super) fn nqueens(
    params: &WorkloadParams,
    ctx: &KernelContext,
    multi: bool,
) -> Result<Measurement, KernelError> {
    let n = params.nqueens_size;

    let (stats, elapsed) = timed(|| -> Result<QueenStats, KernelError> {
        let parts = if multi {
            let tasks: Vec<_> = (0..n).map(|column| move || solve_from_column(n, column)).collect();
            ctx.scatter(tasks)?
        } else {
            (0..n).map(|column| solve_from_column(n, column)).collect()
        };
        Ok(parts.into_iter().fold(QueenStats::default(), |acc, s| QueenStats {
            solutions: acc.solutions + s.solutions,
            nodes: acc.nodes + s.nodes,
        }))
    });
    let stats = stats?;

    if let Some(&known) = NQUEENS_SOLUTIONS.get(n as usize - 1) {
        if stats.solutions != known {
            return Err(KernelError::Verification(format!(
                "{}-queens found {} solutions, expected {}",
                n, stats.solutions, known
            )));
        }
    }

    Ok(Measurement {
        elapsed,
        operations: stats.nodes as f64,
        metrics: json!({ "board_size": n, "solutions": stats.solutions, "nodes": stats.nodes }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segmented_sieve_matches_plain_count() {
        let base = base_primes(317);
        let whole = sieve_segment(0..100_000, &base);
        let split: u64 = shard_ranges(100_000, 7)
            .into_iter()
            .map(|r| sieve_segment(r, &base))
            .sum();
        assert_eq!(whole, 9592);
        assert_eq!(split, whole);
    }

    #[test]
    fn test_fibonacci_reference_values() {
        assert_eq!(fib_recursive(20), 6765);
        assert_eq!(fib_iterative(40), 102_334_155);
        // fib(2) = fib(1) + fib(0): three calls
        assert_eq!(fib_call_count(2), 3.0);
    }

    #[test]
    fn test_nqueens_counts() {
        for n in 4..=9u32 {
            let total: u64 = (0..n).map(|c| solve_from_column(n, c).solutions).sum();
            assert_eq!(total, NQUEENS_SOLUTIONS[n as usize - 1], "n = {}", n);
        }
    }

    #[test]
    fn test_multiply_rows_identity() {
        let n = 3;
        let identity = vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let m: Vec<f64> = (0..9).map(|v| v as f64).collect();
        assert_eq!(multiply_rows(&m, &identity, n, 0..n), m);
        assert_eq!(multiply_rows(&m, &identity, n, 1..2), vec![3.0, 4.0, 5.0]);
    }
}
