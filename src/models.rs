//! Core data types for corebench.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::KernelError;

/// Performance class of a core, derived from its maximum clock frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoreClass {
    Little,
    Mid,
    Big,
}

impl fmt::Display for CoreClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreClass::Little => write!(f, "LITTLE"),
            CoreClass::Mid => write!(f, "MID"),
            CoreClass::Big => write!(f, "BIG"),
        }
    }
}

/// A single logical core as seen by the topology detector.
///
/// Immutable once detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuCore {
    pub id: usize,
    pub max_frequency_hz: u64,
    pub online: bool,
    pub core_class: CoreClass,
}

/// Coarse performance bucket used to size workloads.
///
/// `Test` is the warm-up tier; it is never measured or recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTier {
    Slow,
    Mid,
    Flagship,
    Test,
}

impl DeviceTier {
    /// Tiers a suite may be scored at.
    pub const MEASURED: [DeviceTier; 3] = [DeviceTier::Slow, DeviceTier::Mid, DeviceTier::Flagship];

    pub fn is_measured(&self) -> bool {
        !matches!(self, DeviceTier::Test)
    }
}

impl fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTier::Slow => write!(f, "slow"),
            DeviceTier::Mid => write!(f, "mid"),
            DeviceTier::Flagship => write!(f, "flagship"),
            DeviceTier::Test => write!(f, "test"),
        }
    }
}

impl FromStr for DeviceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slow" => Ok(DeviceTier::Slow),
            "mid" => Ok(DeviceTier::Mid),
            "flagship" => Ok(DeviceTier::Flagship),
            "test" => Ok(DeviceTier::Test),
            other => Err(format!(
                "Invalid device tier '{}'. Expected one of: slow, mid, flagship",
                other
            )),
        }
    }
}

/// Closed identity of every workload in the battery.
///
/// The declaration order of [`KernelId::ALL`] is the execution order of a
/// phase and must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelId {
    PrimeGeneration,
    Fibonacci,
    MatrixMultiplication,
    HashComputing,
    StringSorting,
    RayMarching,
    Compression,
    MonteCarloPi,
    JsonParsing,
    NQueens,
}

impl KernelId {
    /// Fixed roster order.
    pub const ALL: [KernelId; 10] = [
        KernelId::PrimeGeneration,
        KernelId::Fibonacci,
        KernelId::MatrixMultiplication,
        KernelId::HashComputing,
        KernelId::StringSorting,
        KernelId::RayMarching,
        KernelId::Compression,
        KernelId::MonteCarloPi,
        KernelId::JsonParsing,
        KernelId::NQueens,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            KernelId::PrimeGeneration => "Prime Generation",
            KernelId::Fibonacci => "Fibonacci Recursive",
            KernelId::MatrixMultiplication => "Matrix Multiplication",
            KernelId::HashComputing => "Hash Computing",
            KernelId::StringSorting => "String Sorting",
            KernelId::RayMarching => "Ray Marching",
            KernelId::Compression => "Compression",
            KernelId::MonteCarloPi => "Monte Carlo π",
            KernelId::JsonParsing => "JSON Parsing",
            KernelId::NQueens => "N-Queens",
        }
    }
}

impl KernelId {
    /// Stable identifier used in reference tables and JSON output.
    pub fn key(&self) -> &'static str {
        match self {
            KernelId::PrimeGeneration => "prime_generation",
            KernelId::Fibonacci => "fibonacci",
            KernelId::MatrixMultiplication => "matrix_multiplication",
            KernelId::HashComputing => "hash_computing",
            KernelId::StringSorting => "string_sorting",
            KernelId::RayMarching => "ray_marching",
            KernelId::Compression => "compression",
            KernelId::MonteCarloPi => "monte_carlo_pi",
            KernelId::JsonParsing => "json_parsing",
            KernelId::NQueens => "n_queens",
        }
    }
}

/// Exact key match only; there is no fuzzy lookup.
impl FromStr for KernelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KernelId::ALL
            .iter()
            .copied()
            .find(|id| id.key() == s)
            .ok_or_else(|| format!("Unknown kernel id '{}'", s))
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Whether a kernel variant runs on one core or fans out across all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelMode {
    Single,
    Multi,
}

impl KernelMode {
    pub fn label(&self) -> &'static str {
        match self {
            KernelMode::Single => "Single-Core",
            KernelMode::Multi => "Multi-Core",
        }
    }
}

/// Canonical result name, e.g. "Multi-Core Ray Marching".
pub fn result_name(kernel: KernelId, mode: KernelMode) -> String {
    format!("{} {}", mode.label(), kernel.display_name())
}

/// Outcome of exactly one kernel invocation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub kernel: KernelId,
    pub mode: KernelMode,
    pub execution_time_ms: f64,
    pub ops_per_second: f64,
    pub is_valid: bool,
    #[serde(default)]
    pub metrics: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl BenchmarkResult {
    /// Build a result from a timed measurement window.
    pub fn measured(
        kernel: KernelId,
        mode: KernelMode,
        elapsed: Duration,
        operations: f64,
        is_valid: bool,
        metrics: serde_json::Value,
    ) -> Self {
        // A sub-nanosecond window still yields a finite rate.
        let secs = elapsed.as_secs_f64().max(1e-9);
        BenchmarkResult {
            name: result_name(kernel, mode),
            kernel,
            mode,
            execution_time_ms: elapsed.as_secs_f64() * 1000.0,
            ops_per_second: operations / secs,
            is_valid,
            metrics,
            error: None,
        }
    }

    /// Synthesize the invalid zero-throughput result for a failed invocation.
    pub fn failed(kernel: KernelId, mode: KernelMode, error: &KernelError, elapsed: Duration) -> Self {
        BenchmarkResult {
            name: result_name(kernel, mode),
            kernel,
            mode,
            execution_time_ms: elapsed.as_secs_f64() * 1000.0,
            ops_per_second: 0.0,
            is_valid: false,
            metrics: serde_json::json!({
                "error_kind": error.kind(),
            }),
            error: Some(error.to_string()),
        }
    }

    /// Coerce impossible throughput values into an invalid zero result.
    pub fn sanitized(mut self) -> Self {
        if !self.ops_per_second.is_finite() || self.ops_per_second < 0.0 {
            log::warn!(
                "[RESULT] {} reported non-finite or negative throughput ({}); marking invalid",
                self.name,
                self.ops_per_second
            );
            self.ops_per_second = 0.0;
            self.is_valid = false;
            if self.error.is_none() {
                self.error = Some("non-finite throughput".to_string());
            }
        }
        if !self.is_valid {
            self.ops_per_second = 0.0;
        }
        self
    }
}

/// Event mode: which phase produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventMode {
    Single,
    Multi,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventState {
    Started,
    Completed,
}

/// Transient lifecycle notification published around each kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkEvent {
    pub test_name: String,
    pub kernel: KernelId,
    pub mode: EventMode,
    pub state: EventState,
    pub time_ms: f64,
    /// Raw throughput (ops/sec); zero for STARTED events
    pub score: f64,
}

impl BenchmarkEvent {
    pub fn started(test_name: String, kernel: KernelId, mode: EventMode) -> Self {
        BenchmarkEvent {
            test_name,
            kernel,
            mode,
            state: EventState::Started,
            time_ms: 0.0,
            score: 0.0,
        }
    }

    pub fn completed(result: &BenchmarkResult, mode: EventMode) -> Self {
        BenchmarkEvent {
            test_name: result.name.clone(),
            kernel: result.kernel,
            mode,
            state: EventState::Completed,
            time_ms: result.execution_time_ms,
            score: result.ops_per_second,
        }
    }
}

/// Terminal status of a suite run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    Completed,
    Cancelled,
    Failed,
}

/// Per-kernel detail row of a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelScore {
    pub name: String,
    pub kernel: KernelId,
    pub mode: KernelMode,
    pub ops_per_second: f64,
    /// `None` when the kernel was excluded from the aggregate
    pub ratio: Option<f64>,
    /// Ratio scaled by the baseline constant; zero when excluded
    pub score: f64,
    pub is_valid: bool,
}

/// The terminal artifact of a suite run. Produced once; immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub single_core_score: f64,
    pub multi_core_score: f64,
    pub final_score: f64,
    pub normalized_score: f64,
    pub rating: String,
    /// Multi-core aggregate divided by single-core aggregate (0 when single is 0)
    pub core_ratio: f64,
    pub status: SuiteStatus,
    #[serde(default)]
    pub device_tier: Option<DeviceTier>,
    pub reference_version: String,
    pub kernel_scores: Vec<KernelScore>,
    pub per_kernel_results: Vec<BenchmarkResult>,
    #[serde(default)]
    pub failure: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl ScoreSummary {
    /// Well-formed zero summary for a suite that could not run at all.
    pub fn failed(reason: String, lowest_rating: &str, reference_version: &str) -> Self {
        ScoreSummary {
            single_core_score: 0.0,
            multi_core_score: 0.0,
            final_score: 0.0,
            normalized_score: 0.0,
            rating: lowest_rating.to_string(),
            core_ratio: 0.0,
            status: SuiteStatus::Failed,
            device_tier: None,
            reference_version: reference_version.to_string(),
            kernel_scores: Vec::new(),
            per_kernel_results: Vec::new(),
            failure: Some(reason),
            generated_at: Utc::now(),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Persist the summary as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = self.to_json_pretty().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
