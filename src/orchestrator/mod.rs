//! Benchmark orchestration: warm-up, single-core and multi-core phases, then scoring.
//!
//! Kernels run one at a time, to completion, in roster order. Single-core
//! kernels execute on a dedicated worker thread pinned to the fastest core;
//! multi-core kernels drive a pool sized to the present core count. The
//! orchestrator awaits every kernel and yields at each boundary, and checks the
//! cancellation flag only there, never inside a timed region.

pub mod executor;
pub mod pool;
pub mod state;

use std::sync::Arc;
use tokio::sync::{watch, RwLock};

pub use executor::{run_isolated, run_pinned, run_unpinned};
pub use pool::{PinnedWorker, WorkerPool};
pub use state::{SuiteProgress, SuiteState};

use crate::calibration::{params_for, WorkloadParams};
use crate::config::{ScoringConfig, SuiteConfig};
use crate::error::SuiteError;
use crate::events::EventSink;
use crate::hardware::{detect_topology, AffinityController, CpuTopology};
use crate::kernels::{builtin_roster, Kernel};
use crate::models::{
    BenchmarkEvent, BenchmarkResult, DeviceTier, EventMode, KernelMode, ScoreSummary,
    SuiteStatus,
};
use crate::scoring::ScoringEngine;

/// Worker threads owned for the duration of one run.
struct Workers {
    single: PinnedWorker,
    pool: Arc<WorkerPool>,
}

/// Outcome of iterating one roster.
enum PhaseOutcome {
    Finished(Vec<BenchmarkResult>),
    Cancelled(Vec<BenchmarkResult>),
}

/// Runs the full battery and produces a `ScoreSummary`.
pub struct BenchmarkOrchestrator {
    topology: Arc<CpuTopology>,
    affinity: Arc<AffinityController>,
    scoring: ScoringEngine,
    single_roster: Vec<Arc<dyn Kernel>>,
    multi_roster: Vec<Arc<dyn Kernel>>,
    sinks: Vec<Arc<dyn EventSink>>,
    cancel_rx: Option<watch::Receiver<bool>>,
    progress: Arc<RwLock<SuiteProgress>>,
}

impl BenchmarkOrchestrator {
    /// Orchestrator for this host: cached topology, native affinity, built-in kernels.
    pub fn new(config: ScoringConfig) -> Self {
        let topology = detect_topology();
        let affinity = Arc::new(AffinityController::new(&topology));
        Self::with_parts(topology, affinity, config)
    }

    /// Orchestrator over an explicit topology and affinity controller.
    pub fn with_parts(
        topology: Arc<CpuTopology>,
        affinity: Arc<AffinityController>,
        config: ScoringConfig,
    ) -> Self {
        BenchmarkOrchestrator {
            topology,
            affinity,
            scoring: ScoringEngine::new(config),
            single_roster: builtin_roster(KernelMode::Single),
            multi_roster: builtin_roster(KernelMode::Multi),
            sinks: Vec::new(),
            cancel_rx: None,
            progress: Arc::new(RwLock::new(SuiteProgress::new())),
        }
    }

    /// Replace the kernel rosters. Order is execution order.
    pub fn with_rosters(mut self, single: Vec<Arc<dyn Kernel>>, multi: Vec<Arc<dyn Kernel>>) -> Self {
        self.single_roster = single;
        self.multi_roster = multi;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Honor `true` on this channel at the next kernel boundary.
    pub fn with_cancellation(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn topology(&self) -> &CpuTopology {
        &self.topology
    }

    pub fn affinity(&self) -> &AffinityController {
        &self.affinity
    }

    pub async fn current_state(&self) -> SuiteState {
        self.progress.read().await.state
    }

    pub async fn progress(&self) -> SuiteProgress {
        self.progress.read().await.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    fn publish(&self, event: BenchmarkEvent) {
        for sink in &self.sinks {
            sink.publish(&event);
        }
    }

    async fn advance(&self, next: SuiteState) {
        if let Err(e) = self.progress.write().await.transition_to(next) {
            log::error!("[ORCHESTRATOR] {}", e);
        }
    }

    async fn fail(&self, error: SuiteError) -> ScoreSummary {
        log::error!("[ORCHESTRATOR] Suite failed: {}", error);
        if let Err(e) = self.progress.write().await.record_failure(&error) {
            log::error!("[ORCHESTRATOR] {}", e);
        }
        let config = self.scoring.config();
        ScoreSummary::failed(error.to_string(), config.lowest_rating(), &config.version)
    }

    fn spawn_workers(&self) -> Result<Workers, SuiteError> {
        let single = PinnedWorker::spawn()?;
        let pool = Arc::new(WorkerPool::new(self.topology.present_count)?);
        Ok(Workers { single, pool })
    }

    /// Run one kernel with its placement, bracketed by STARTED / COMPLETED events.
    async fn run_kernel(
        &self,
        workers: &Workers,
        kernel: &Arc<dyn Kernel>,
        params: &Arc<WorkloadParams>,
        event_mode: EventMode,
    ) -> BenchmarkResult {
        self.publish(BenchmarkEvent::started(kernel.name(), kernel.id(), event_mode));

        let result = match kernel.mode() {
            KernelMode::Single => {
                run_pinned(
                    &workers.single,
                    Arc::clone(&self.affinity),
                    Arc::clone(kernel),
                    Arc::clone(params),
                )
                .await
            }
            KernelMode::Multi => {
                run_unpinned(
                    Arc::clone(&workers.pool),
                    Arc::clone(&self.affinity),
                    Arc::clone(kernel),
                    Arc::clone(params),
                )
                .await
            }
        };

        self.publish(BenchmarkEvent::completed(&result, event_mode));
        result
    }

    /// Iterate `roster` in order, stopping early only on cancellation.
    async fn run_phase(
        &self,
        workers: &Workers,
        roster: &[Arc<dyn Kernel>],
        params: &Arc<WorkloadParams>,
        event_mode: EventMode,
    ) -> PhaseOutcome {
        let mut results = Vec::with_capacity(roster.len());
        for kernel in roster {
            if self.is_cancelled() {
                log::info!(
                    "[ORCHESTRATOR] Cancellation requested; skipping {} remaining kernel(s)",
                    roster.len() - results.len()
                );
                return PhaseOutcome::Cancelled(results);
            }

            let result = self.run_kernel(workers, kernel, params, event_mode).await;
            log::info!(
                "[ORCHESTRATOR] {}: {:.3e} ops/s in {:.1} ms{}",
                result.name,
                result.ops_per_second,
                result.execution_time_ms,
                if result.is_valid { "" } else { " (invalid)" }
            );
            if event_mode != EventMode::Test {
                self.progress.write().await.record_kernel_completed();
            }
            results.push(result);

            tokio::task::yield_now().await;
        }
        PhaseOutcome::Finished(results)
    }

    /// Run the whole battery once at the test tier. Results are discarded.
    async fn run_warmup(&self, workers: &Workers) -> bool {
        let params = Arc::new(params_for(DeviceTier::Test));
        log::info!("[ORCHESTRATOR] Warm-up pass");

        for roster in [&self.single_roster, &self.multi_roster] {
            match self.run_phase(workers, roster, &params, EventMode::Test).await {
                PhaseOutcome::Finished(results) => {
                    for result in results.iter().filter(|r| !r.is_valid) {
                        log::warn!(
                            "[ORCHESTRATOR] Warm-up run of {} failed: {}",
                            result.name,
                            result.error.as_deref().unwrap_or("invalid result")
                        );
                    }
                }
                PhaseOutcome::Cancelled(_) => return false,
            }
        }
        true
    }

    /// Execute the suite. Always returns a well-formed summary.
    pub async fn run(&self, suite: &SuiteConfig) -> ScoreSummary {
        let total = self.single_roster.len() + self.multi_roster.len();
        if let Err(e) = self.progress.write().await.begin(total) {
            log::error!("[ORCHESTRATOR] Cannot start: {}", e);
            let config = self.scoring.config();
            return ScoreSummary::failed(e.to_string(), config.lowest_rating(), &config.version);
        }

        if !suite.tier.is_measured() {
            return self.fail(SuiteError::UnmeasuredTier(suite.tier)).await;
        }
        if self.topology.present_count == 0 {
            return self.fail(SuiteError::NoCores).await;
        }
        let workers = match self.spawn_workers() {
            Ok(workers) => workers,
            Err(e) => return self.fail(e).await,
        };

        log::info!(
            "[ORCHESTRATOR] Starting {} tier suite on {} cores ({} kernels)",
            suite.tier,
            self.topology.present_count,
            total
        );

        let mut cancelled = false;
        if suite.warmup {
            self.advance(SuiteState::Warmup).await;
            cancelled = !self.run_warmup(&workers).await;
        }

        let params = Arc::new(params_for(suite.tier));
        let mut single_results = Vec::new();
        let mut multi_results = Vec::new();

        if !cancelled {
            self.advance(SuiteState::SingleCore).await;
            match self
                .run_phase(&workers, &self.single_roster, &params, EventMode::Single)
                .await
            {
                PhaseOutcome::Finished(results) => single_results = results,
                PhaseOutcome::Cancelled(results) => {
                    single_results = results;
                    cancelled = true;
                }
            }
        }

        if !cancelled {
            self.advance(SuiteState::MultiCore).await;
            match self
                .run_phase(&workers, &self.multi_roster, &params, EventMode::Multi)
                .await
            {
                PhaseOutcome::Finished(results) => multi_results = results,
                PhaseOutcome::Cancelled(results) => {
                    multi_results = results;
                    cancelled = true;
                }
            }
        }

        drop(workers);

        self.advance(SuiteState::Scoring).await;
        let mut summary = self.scoring.summarize(&single_results, &multi_results);
        summary.device_tier = Some(suite.tier);
        if cancelled {
            summary.status = SuiteStatus::Cancelled;
        }
        self.advance(SuiteState::Complete).await;

        log::info!(
            "[ORCHESTRATOR] Suite {:?}: final score {:.2} ({})",
            summary.status,
            summary.final_score,
            summary.rating
        );
        summary
    }
}
