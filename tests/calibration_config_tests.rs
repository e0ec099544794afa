//! Workload calibration tables and scoring reference loading.

use corebench::calibration::{params_for, WORKLOAD_SEED};
use corebench::config::{
    load_or_builtin, load_scoring_config, save_scoring_config, ScoringConfig,
};
use corebench::models::{DeviceTier, KernelId, KernelMode};
use corebench::ConfigError;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

fn any_tier() -> impl Strategy<Value = DeviceTier> {
    prop_oneof![
        Just(DeviceTier::Slow),
        Just(DeviceTier::Mid),
        Just(DeviceTier::Flagship),
        Just(DeviceTier::Test),
    ]
}

// ============================================================================
// CALIBRATION
// ============================================================================

proptest! {
    #[test]
    fn prop_params_are_deterministic(tier in any_tier()) {
        let first = params_for(tier);
        let second = params_for(tier);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        prop_assert_eq!(first.tier, tier);
        prop_assert_eq!(first.seed, WORKLOAD_SEED);
        prop_assert!(first.validate().is_ok());
    }
}

#[test]
fn test_tiers_scale_monotonically() {
    let slow = params_for(DeviceTier::Slow);
    let mid = params_for(DeviceTier::Mid);
    let flagship = params_for(DeviceTier::Flagship);

    assert!(slow.prime_range < mid.prime_range && mid.prime_range < flagship.prime_range);
    assert!(slow.matrix_size < mid.matrix_size && mid.matrix_size < flagship.matrix_size);
    assert!(slow.monte_carlo_samples < mid.monte_carlo_samples);
    assert!(mid.monte_carlo_samples < flagship.monte_carlo_samples);
    assert!(slow.nqueens_size <= mid.nqueens_size && mid.nqueens_size <= flagship.nqueens_size);
}

#[test]
fn test_warmup_tier_is_smallest() {
    let test = params_for(DeviceTier::Test);
    let slow = params_for(DeviceTier::Slow);
    assert!(test.prime_range < slow.prime_range);
    assert!(test.fibonacci_n_range.1 < slow.fibonacci_n_range.0);
    assert!(test.hash_data_kb < slow.hash_data_kb);
    assert!(test.string_count < slow.string_count);
}

#[test]
fn test_tier_names_parse() {
    assert_eq!("flagship".parse::<DeviceTier>(), Ok(DeviceTier::Flagship));
    assert_eq!(" Mid ".parse::<DeviceTier>(), Ok(DeviceTier::Mid));
    assert!("ultra".parse::<DeviceTier>().is_err());
}

// ============================================================================
// SCORING REFERENCE
// ============================================================================

#[test]
fn test_reference_override_changes_scores_without_code() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scoring.toml");

    let mut config = ScoringConfig::builtin().unwrap();
    config.version = "lab-2026".to_string();
    config.baseline_scale = 100.0;
    config.reference = config
        .reference
        .with(KernelMode::Single, KernelId::NQueens, 1.0);
    save_scoring_config(&config, &path).unwrap();

    let loaded = load_or_builtin(Some(&path)).unwrap();
    assert_eq!(loaded.version, "lab-2026");
    assert_eq!(loaded.baseline_scale, 100.0);
    assert_eq!(loaded.reference.baseline(KernelMode::Single, KernelId::NQueens), Some(1.0));
}

#[test]
fn test_hand_written_json_reference() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scoring.json");
    fs::write(
        &path,
        r#"{
            "version": "json-1",
            "baseline_scale": 100.0,
            "single_core_weight": 0.5,
            "multi_core_weight": 0.5,
            "reference": {
                "single": { "prime_generation": 100.0 },
                "multi": { "prime_generation": 400.0 }
            },
            "rating": [
                { "min_score": 100.0, "label": "Pass" },
                { "min_score": 0.0, "label": "Fail" }
            ]
        }"#,
    )
    .unwrap();

    let config = load_scoring_config(&path).unwrap();
    assert_eq!(config.single_core_weight, 0.5);
    assert_eq!(config.reference.baseline(KernelMode::Multi, KernelId::PrimeGeneration), Some(400.0));
    assert_eq!(config.reference.baseline(KernelMode::Multi, KernelId::Fibonacci), None);
    assert_eq!(config.rating_for(99.0), "Fail");
}

#[test]
fn test_invalid_references_are_rejected() {
    let base = ScoringConfig::builtin().unwrap();

    let mut weights = base.clone();
    weights.multi_core_weight = 0.7;
    assert!(matches!(weights.validate(), Err(ConfigError::ValidationFailed(_))));

    let toml_text = toml::to_string(&base).unwrap().replace("n_queens", "n_queen");
    assert!(matches!(
        ScoringConfig::from_toml_str(&toml_text),
        Err(ConfigError::ValidationFailed(_))
    ));

    let mut ladder = base.clone();
    ladder.rating.swap(0, 1);
    assert!(ladder.validate().is_err());

    let mut baseline = base.clone();
    baseline.reference = baseline
        .reference
        .with(KernelMode::Multi, KernelId::Compression, 0.0);
    assert!(baseline.validate().is_err());

    let mut scale = base;
    scale.baseline_scale = f64::NAN;
    assert!(scale.validate().is_err());
}

#[test]
fn test_saving_invalid_config_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scoring.toml");

    let mut config = ScoringConfig::builtin().unwrap();
    config.version = "  ".to_string();
    assert!(save_scoring_config(&config, &path).is_err());
    assert!(!path.exists());
}
