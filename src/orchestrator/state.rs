//! Suite state machine.
//!
//! `IDLE -> WARMUP -> SINGLE_CORE -> MULTI_CORE -> SCORING -> COMPLETE`.
//! Warm-up may be skipped, and a cancellation jumps from whichever measured
//! phase is running straight to SCORING. FAILED is entered only on total
//! environmental failure (no cores, no workers), never because a kernel failed.

use crate::error::SuiteError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuiteState {
    Idle,
    Warmup,
    SingleCore,
    MultiCore,
    Scoring,
    Complete,
    Failed,
}

impl SuiteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuiteState::Idle => "idle",
            SuiteState::Warmup => "warmup",
            SuiteState::SingleCore => "single_core",
            SuiteState::MultiCore => "multi_core",
            SuiteState::Scoring => "scoring",
            SuiteState::Complete => "complete",
            SuiteState::Failed => "failed",
        }
    }

    /// Get all valid transitions FROM this state.
    pub fn valid_next_states(&self) -> Vec<SuiteState> {
        match self {
            SuiteState::Idle => vec![SuiteState::Warmup, SuiteState::SingleCore, SuiteState::Failed],
            SuiteState::Warmup => vec![SuiteState::SingleCore, SuiteState::Scoring, SuiteState::Failed],
            SuiteState::SingleCore => vec![SuiteState::MultiCore, SuiteState::Scoring, SuiteState::Failed],
            SuiteState::MultiCore => vec![SuiteState::Scoring, SuiteState::Failed],
            SuiteState::Scoring => vec![SuiteState::Complete],
            // A finished orchestrator may be run again.
            SuiteState::Complete => vec![SuiteState::Idle],
            SuiteState::Failed => vec![SuiteState::Idle],
        }
    }

    pub fn can_transition_to(&self, next: SuiteState) -> bool {
        self.valid_next_states().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SuiteState::Complete | SuiteState::Failed)
    }
}

/// Live snapshot of a suite run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteProgress {
    pub state: SuiteState,
    /// Measured kernels finished so far (warm-up excluded)
    pub kernels_completed: usize,
    pub kernels_total: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub error: Option<String>,
}

impl SuiteProgress {
    pub fn new() -> Self {
        SuiteProgress {
            state: SuiteState::Idle,
            kernels_completed: 0,
            kernels_total: 0,
            started_at: None,
            last_update: Utc::now(),
            error: None,
        }
    }

    /// Attempt to move to `next`.
    pub fn transition_to(&mut self, next: SuiteState) -> Result<(), SuiteError> {
        if !self.state.can_transition_to(next) {
            return Err(SuiteError::InvalidTransition {
                from: self.state.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        log::debug!("[ORCHESTRATOR] {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
        self.last_update = Utc::now();
        Ok(())
    }

    /// Reset for a new run.
    pub fn begin(&mut self, kernels_total: usize) -> Result<(), SuiteError> {
        if self.state.is_terminal() {
            self.transition_to(SuiteState::Idle)?;
        }
        if self.state != SuiteState::Idle {
            return Err(SuiteError::InvalidTransition {
                from: self.state.as_str().to_string(),
                to: SuiteState::Idle.as_str().to_string(),
            });
        }
        self.kernels_completed = 0;
        self.kernels_total = kernels_total;
        self.started_at = Some(Utc::now());
        self.error = None;
        Ok(())
    }

    pub fn record_kernel_completed(&mut self) {
        self.kernels_completed += 1;
        self.last_update = Utc::now();
    }

    /// Record an environmental failure and enter FAILED.
    pub fn record_failure(&mut self, error: &SuiteError) -> Result<(), SuiteError> {
        self.error = Some(error.to_string());
        self.transition_to(SuiteState::Failed)
    }
}

impl Default for SuiteProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut progress = SuiteProgress::new();
        for next in [
            SuiteState::Warmup,
            SuiteState::SingleCore,
            SuiteState::MultiCore,
            SuiteState::Scoring,
            SuiteState::Complete,
        ] {
            assert!(progress.transition_to(next).is_ok(), "-> {:?}", next);
        }
        assert!(progress.state.is_terminal());
    }

    #[test]
    fn test_invalid_transition() {
        let mut progress = SuiteProgress::new();
        let err = progress.transition_to(SuiteState::Scoring).unwrap_err();
        assert_eq!(err.to_string(), "Invalid state transition: idle -> scoring");
        assert_eq!(progress.state, SuiteState::Idle);
    }

    #[test]
    fn test_cancellation_jumps_to_scoring() {
        assert!(SuiteState::SingleCore.can_transition_to(SuiteState::Scoring));
        assert!(SuiteState::Warmup.can_transition_to(SuiteState::Scoring));
        assert!(!SuiteState::Scoring.can_transition_to(SuiteState::Failed));
    }

    #[test]
    fn test_begin_resets_finished_run() {
        let mut progress = SuiteProgress::new();
        progress.record_failure(&SuiteError::NoCores).unwrap();
        assert_eq!(progress.state, SuiteState::Failed);
        assert_eq!(progress.error.as_deref(), Some("No CPU cores detectable"));

        progress.begin(20).unwrap();
        assert_eq!(progress.state, SuiteState::Idle);
        assert_eq!(progress.kernels_total, 20);
        assert!(progress.error.is_none());
    }
}
