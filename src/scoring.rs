//! Scoring engine: reference-normalized geometric mean per phase, weighted
//! final score, rating ladder.
//!
//! Each kernel's throughput is divided by its reference baseline. The ratios of
//! one phase are reduced with a geometric mean (computed in log space) and
//! multiplied by `baseline_scale`, so a device identical to the reference scores
//! exactly `baseline_scale` per phase however many kernels took part. The two
//! phase aggregates are combined with the configured weights.

use crate::config::ScoringConfig;
use crate::models::{BenchmarkResult, KernelScore, ScoreSummary, SuiteStatus};
use chrono::Utc;

/// Geometric mean of strictly positive, finite values; 0.0 for an empty set.
pub fn geometric_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    (log_sum / values.len() as f64).exp()
}

/// Aggregate of one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseAggregate {
    /// Scaled geometric mean of the included ratios
    pub score: f64,
    /// Number of kernels that contributed a ratio
    pub included: usize,
    pub kernel_scores: Vec<KernelScore>,
}

pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        ScoringEngine { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// `ops / baseline` for a result, or `None` when it cannot take part.
    ///
    /// Results with no baseline are skipped with a warning rather than counted
    /// as 0 or 1. Invalid results and non-positive throughput are skipped too:
    /// a zero ratio would collapse the whole geometric mean.
    pub fn kernel_ratio(&self, result: &BenchmarkResult) -> Option<f64> {
        let Some(baseline) = self.config.reference.baseline(result.mode, result.kernel) else {
            log::warn!(
                "[SCORING] No reference baseline for {}; excluded from aggregate",
                result.name
            );
            return None;
        };

        if !result.is_valid {
            log::warn!(
                "[SCORING] {} is invalid ({}); excluded from aggregate",
                result.name,
                result.error.as_deref().unwrap_or("no error recorded")
            );
            return None;
        }

        let ratio = result.ops_per_second / baseline;
        if !ratio.is_finite() || ratio <= 0.0 {
            log::warn!(
                "[SCORING] {} produced unusable ratio {}; excluded from aggregate",
                result.name,
                ratio
            );
            return None;
        }
        Some(ratio)
    }

    /// Reduce one phase's results to its aggregate score.
    pub fn phase_aggregate(&self, results: &[BenchmarkResult]) -> PhaseAggregate {
        let scale = self.config.baseline_scale;
        let mut ratios = Vec::with_capacity(results.len());

        let kernel_scores = results
            .iter()
            .map(|result| {
                let ratio = self.kernel_ratio(result);
                if let Some(r) = ratio {
                    ratios.push(r);
                }
                KernelScore {
                    name: result.name.clone(),
                    kernel: result.kernel,
                    mode: result.mode,
                    ops_per_second: result.ops_per_second,
                    ratio,
                    score: ratio.map(|r| r * scale).unwrap_or(0.0),
                    is_valid: result.is_valid,
                }
            })
            .collect();

        PhaseAggregate {
            score: geometric_mean(&ratios) * scale,
            included: ratios.len(),
            kernel_scores,
        }
    }

    /// A multi-core aggregate that does not beat a nonzero single-core one
    /// points at an unparallelized kernel or a stale reference. Warn only.
    pub fn multi_core_suspect(&self, single: f64, multi: f64) -> bool {
        single > 0.0 && multi <= single
    }

    /// `single * w_single + multi * w_multi`.
    pub fn weighted_final(&self, single: f64, multi: f64) -> f64 {
        single * self.config.single_core_weight + multi * self.config.multi_core_weight
    }

    /// Produce the terminal summary for a pair of phase result lists.
    pub fn summarize(
        &self,
        single_results: &[BenchmarkResult],
        multi_results: &[BenchmarkResult],
    ) -> ScoreSummary {
        let single = self.phase_aggregate(single_results);
        let multi = self.phase_aggregate(multi_results);

        if self.multi_core_suspect(single.score, multi.score) {
            log::warn!(
                "[SCORING] Multi-core aggregate {:.2} does not exceed single-core {:.2}; \
                 check for an unparallelized kernel or a stale reference table",
                multi.score,
                single.score
            );
        }

        let final_score = self.weighted_final(single.score, multi.score);
        let core_ratio = if single.score > 0.0 {
            multi.score / single.score
        } else {
            0.0
        };
        let rating = self.config.rating_for(final_score).to_string();

        log::info!(
            "[SCORING] single {:.2} ({} kernels), multi {:.2} ({} kernels), final {:.2} -> {}",
            single.score,
            single.included,
            multi.score,
            multi.included,
            final_score,
            rating
        );

        let mut kernel_scores = single.kernel_scores;
        kernel_scores.extend(multi.kernel_scores);
        let per_kernel_results = single_results
            .iter()
            .chain(multi_results)
            .cloned()
            .collect();

        ScoreSummary {
            single_core_score: single.score,
            multi_core_score: multi.score,
            final_score,
            normalized_score: final_score,
            rating,
            core_ratio,
            status: SuiteStatus::Completed,
            device_tier: None,
            reference_version: self.config.version.clone(),
            kernel_scores,
            per_kernel_results,
            failure: None,
            generated_at: Utc::now(),
        }
    }
}
