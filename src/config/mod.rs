//! Versioned scoring configuration and suite settings.
//!
//! The reference baselines, phase weights and rating ladder are data. The
//! shipped set lives in `config/reference.toml` and is compiled in; a user file
//! can replace it (see `loader`).

pub mod loader;

use crate::error::ConfigError;
use crate::models::{DeviceTier, KernelId, KernelMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub use loader::{
    default_scoring_config_path, load_or_builtin, load_scoring_config, save_scoring_config,
    validate_config_path,
};

const BUILTIN_REFERENCE: &str = include_str!("../../config/reference.toml");

/// Tolerance for the weights summing to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Baseline throughput per kernel, per mode, keyed by `KernelId::key()`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferenceTable {
    #[serde(default)]
    pub single: BTreeMap<String, f64>,
    #[serde(default)]
    pub multi: BTreeMap<String, f64>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, mode: KernelMode, kernel: KernelId, ops_per_second: f64) -> Self {
        self.table_mut(mode)
            .insert(kernel.key().to_string(), ops_per_second);
        self
    }

    pub fn baseline(&self, mode: KernelMode, kernel: KernelId) -> Option<f64> {
        self.table(mode).get(kernel.key()).copied()
    }

    pub fn table(&self, mode: KernelMode) -> &BTreeMap<String, f64> {
        match mode {
            KernelMode::Single => &self.single,
            KernelMode::Multi => &self.multi,
        }
    }

    fn table_mut(&mut self, mode: KernelMode) -> &mut BTreeMap<String, f64> {
        match mode {
            KernelMode::Single => &mut self.single,
            KernelMode::Multi => &mut self.multi,
        }
    }
}

/// One rung of the rating ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingBand {
    pub min_score: f64,
    pub label: String,
}

impl RatingBand {
    pub fn new(min_score: f64, label: &str) -> Self {
        RatingBand {
            min_score,
            label: label.to_string(),
        }
    }
}

/// Everything the scoring engine needs besides the measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub version: String,
    /// Aggregate awarded to a device matching the reference exactly
    pub baseline_scale: f64,
    pub single_core_weight: f64,
    pub multi_core_weight: f64,
    pub reference: ReferenceTable,
    /// Highest threshold first
    pub rating: Vec<RatingBand>,
}

impl ScoringConfig {
    /// Config with the default 0.35 / 0.65 phase weights.
    pub fn new(
        version: &str,
        baseline_scale: f64,
        reference: ReferenceTable,
        rating: Vec<RatingBand>,
    ) -> Self {
        ScoringConfig {
            version: version.to_string(),
            baseline_scale,
            single_core_weight: 0.35,
            multi_core_weight: 0.65,
            reference,
            rating,
        }
    }

    /// The reference set compiled into the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml_str(BUILTIN_REFERENCE)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScoringConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScoringConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant the scoring engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "version must not be empty".to_string(),
            ));
        }

        if !self.baseline_scale.is_finite() || self.baseline_scale <= 0.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "baseline_scale must be finite and positive, got {}",
                self.baseline_scale
            )));
        }

        for (name, weight) in [
            ("single_core_weight", self.single_core_weight),
            ("multi_core_weight", self.multi_core_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be finite and non-negative, got {}",
                    name, weight
                )));
            }
        }
        let sum = self.single_core_weight + self.multi_core_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::ValidationFailed(format!(
                "phase weights must sum to 1, got {}",
                sum
            )));
        }

        for mode in [KernelMode::Single, KernelMode::Multi] {
            for (key, &baseline) in self.reference.table(mode) {
                KernelId::from_str(key).map_err(ConfigError::ValidationFailed)?;
                if !baseline.is_finite() || baseline <= 0.0 {
                    return Err(ConfigError::ValidationFailed(format!(
                        "reference.{}.{} must be finite and positive, got {}",
                        mode_key(mode),
                        key,
                        baseline
                    )));
                }
            }
        }

        if self.rating.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "rating ladder must not be empty".to_string(),
            ));
        }
        for band in &self.rating {
            if !band.min_score.is_finite() || band.label.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "invalid rating band '{}' at {}",
                    band.label, band.min_score
                )));
            }
        }
        if self
            .rating
            .windows(2)
            .any(|pair| pair[0].min_score <= pair[1].min_score)
        {
            return Err(ConfigError::ValidationFailed(
                "rating thresholds must be strictly descending".to_string(),
            ));
        }

        Ok(())
    }

    /// Label of the first band whose threshold `score` reaches; the last band otherwise.
    pub fn rating_for(&self, score: f64) -> &str {
        self.rating
            .iter()
            .find(|band| score >= band.min_score)
            .or_else(|| self.rating.last())
            .map(|band| band.label.as_str())
            .unwrap_or("Low")
    }

    pub fn lowest_rating(&self) -> &str {
        self.rating.last().map(|b| b.label.as_str()).unwrap_or("Low")
    }
}

fn mode_key(mode: KernelMode) -> &'static str {
    match mode {
        KernelMode::Single => "single",
        KernelMode::Multi => "multi",
    }
}

/// Knobs for one suite run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Measured tier, chosen by the caller
    pub tier: DeviceTier,
    /// Run the whole battery once at the test tier before measuring
    pub warmup: bool,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        SuiteConfig {
            tier: DeviceTier::Mid,
            warmup: true,
        }
    }
}
