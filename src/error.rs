//! Unified error type hierarchy for corebench
//!
//! Provides structured error handling with TopologyError, AffinityError,
//! KernelError, ConfigError and SuiteError. Nothing here escapes the suite
//! boundary: the orchestrator downgrades every variant to data (an invalid
//! result, a degraded mode, or a FAILED summary).

use std::io;
use thiserror::Error;

/// CPU topology detection errors.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("CPU sysfs tree not found at: {0}")]
    SysfsMissing(String),

    #[error("Failed to parse frequency for cpu{core}: {reason}")]
    FrequencyParse { core: usize, reason: String },

    #[error("No CPU cores could be enumerated")]
    NoCores,

    #[error("IO error during topology detection: {0}")]
    IoError(#[from] io::Error),
}

/// Thread placement and scheduling priority errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AffinityError {
    #[error("Core affinity is not supported on this host: {0}")]
    Unsupported(String),

    #[error("{op} failed: {reason}")]
    Syscall { op: &'static str, reason: String },

    #[error("Core {core} is out of range (present: {present})")]
    CoreOutOfRange { core: usize, present: usize },
}

/// Failures raised by (or around) a single kernel invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("Kernel panicked: {0}")]
    Panicked(String),

    #[error("Invalid workload parameters: {0}")]
    InvalidParams(String),

    #[error("Kernel output failed verification: {0}")]
    Verification(String),

    #[error("Worker unavailable: {0}")]
    Worker(String),

    #[error("Kernel failed: {0}")]
    Failed(String),
}

/// Scoring configuration parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Failed to serialize TOML config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Suite-level failures; each one ends the run in the FAILED state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuiteError {
    #[error("No CPU cores detectable")]
    NoCores,

    #[error("Failed to spawn benchmark worker: {0}")]
    WorkerSpawn(String),

    #[error("The {0} tier is reserved for warm-up and cannot be measured")]
    UnmeasuredTier(crate::models::DeviceTier),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl KernelError {
    /// Short, stable tag used in result metrics and detail rows
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::Panicked(_) => "panicked",
            KernelError::InvalidParams(_) => "invalid_params",
            KernelError::Verification(_) => "verification",
            KernelError::Worker(_) => "worker",
            KernelError::Failed(_) => "failed",
        }
    }
}
