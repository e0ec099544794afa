//! Fault-isolated kernel invocation.
//!
//! Every path out of here is a `BenchmarkResult`. Kernel errors, panics,
//! non-finite throughput, a lost worker or a failed join all become an invalid
//! zero-throughput result tagged with the cause, and the placement guard is
//! dropped on every one of those paths.

use super::pool::{panic_message, PinnedWorker, WorkerPool};
use crate::calibration::WorkloadParams;
use crate::error::KernelError;
use crate::hardware::AffinityController;
use crate::kernels::{Kernel, KernelContext};
use crate::models::BenchmarkResult;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn failed_result(kernel: &dyn Kernel, error: &KernelError, elapsed: Duration) -> BenchmarkResult {
    log::error!("[ORCHESTRATOR] {} failed: {}", kernel.name(), error);
    let mut result = BenchmarkResult::failed(kernel.id(), kernel.mode(), error, elapsed);
    result.name = kernel.name();
    result
}

/// Invoke `kernel` on the calling thread, catching errors and panics.
pub fn run_isolated(kernel: &dyn Kernel, params: &WorkloadParams, ctx: &KernelContext) -> BenchmarkResult {
    let start = Instant::now();
    match panic::catch_unwind(AssertUnwindSafe(|| kernel.run(params, ctx))) {
        Ok(Ok(mut result)) => {
            // The roster entry is authoritative for identity.
            result.kernel = kernel.id();
            result.mode = kernel.mode();
            result.name = kernel.name();
            result.sanitized()
        }
        Ok(Err(e)) => failed_result(kernel, &e, start.elapsed()),
        Err(payload) => failed_result(
            kernel,
            &KernelError::Panicked(panic_message(payload)),
            start.elapsed(),
        ),
    }
}

/// Run a single-core kernel on the dedicated worker, pinned and boosted.
pub async fn run_pinned(
    worker: &PinnedWorker,
    affinity: Arc<AffinityController>,
    kernel: Arc<dyn Kernel>,
    params: Arc<WorkloadParams>,
) -> BenchmarkResult {
    let start = Instant::now();
    let task_kernel = Arc::clone(&kernel);
    let outcome = worker
        .submit(move || {
            let _guard = affinity.pinned_scope();
            run_isolated(task_kernel.as_ref(), &params, &KernelContext::single())
        })
        .await;

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(panic_msg)) => failed_result(
            kernel.as_ref(),
            &KernelError::Panicked(panic_msg),
            start.elapsed(),
        ),
        Err(_) => failed_result(
            kernel.as_ref(),
            &KernelError::Worker("single-core worker is gone".to_string()),
            start.elapsed(),
        ),
    }
}

/// Run a multi-core kernel driver on a blocking thread, unpinned and boosted.
pub async fn run_unpinned(
    pool: Arc<WorkerPool>,
    affinity: Arc<AffinityController>,
    kernel: Arc<dyn Kernel>,
    params: Arc<WorkloadParams>,
) -> BenchmarkResult {
    let start = Instant::now();
    let task_kernel = Arc::clone(&kernel);
    let handle = tokio::task::spawn_blocking(move || {
        let _guard = affinity.unpinned_scope();
        run_isolated(task_kernel.as_ref(), &params, &KernelContext::multi(pool))
    });

    match handle.await {
        Ok(result) => result,
        Err(e) => failed_result(
            kernel.as_ref(),
            &KernelError::Worker(format!("multi-core driver join failed: {}", e)),
            start.elapsed(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::params_for;
    use crate::hardware::CpuTopology;
    use crate::models::{DeviceTier, KernelId, KernelMode};

    struct Exploding;

    impl Kernel for Exploding {
        fn id(&self) -> KernelId {
            KernelId::JsonParsing
        }

        fn mode(&self) -> KernelMode {
            KernelMode::Single
        }

        fn run(&self, _: &WorkloadParams, _: &KernelContext) -> Result<BenchmarkResult, KernelError> {
            panic!("parser blew up");
        }
    }

    struct Infinite;

    impl Kernel for Infinite {
        fn id(&self) -> KernelId {
            KernelId::MonteCarloPi
        }

        fn mode(&self) -> KernelMode {
            KernelMode::Multi
        }

        fn run(&self, _: &WorkloadParams, _: &KernelContext) -> Result<BenchmarkResult, KernelError> {
            let mut result = BenchmarkResult::measured(
                self.id(),
                self.mode(),
                Duration::from_millis(1),
                1.0,
                true,
                serde_json::Value::Null,
            );
            result.ops_per_second = f64::INFINITY;
            Ok(result)
        }
    }

    #[test]
    fn test_panic_becomes_invalid_result() {
        let result = run_isolated(&Exploding, &params_for(DeviceTier::Test), &KernelContext::single());
        assert!(!result.is_valid);
        assert_eq!(result.ops_per_second, 0.0);
        assert_eq!(result.name, "Single-Core JSON Parsing");
        assert_eq!(result.error.as_deref(), Some("Kernel panicked: parser blew up"));
    }

    #[test]
    fn test_infinite_throughput_is_invalid() {
        let result = run_isolated(&Infinite, &params_for(DeviceTier::Test), &KernelContext::single());
        assert!(!result.is_valid);
        assert_eq!(result.ops_per_second, 0.0);
    }

    #[tokio::test]
    async fn test_pinned_panic_still_returns_result() {
        let worker = PinnedWorker::spawn().unwrap();
        let affinity = Arc::new(AffinityController::new(&CpuTopology::unknown(1)));
        let result = run_pinned(
            &worker,
            affinity,
            Arc::new(Exploding),
            Arc::new(params_for(DeviceTier::Test)),
        )
        .await;
        assert!(!result.is_valid);

        // The worker is still usable afterwards.
        let again = worker.submit(|| 5u8).await.unwrap();
        assert_eq!(again, Ok(5));
    }
}
