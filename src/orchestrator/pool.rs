//! Worker threads for kernel execution.
//!
//! `WorkerPool` is the fan-out target for multi-core kernels: one OS thread
//! per present core, fed through a crossbeam job channel. `PinnedWorker` is the
//! single long-lived thread every single-core kernel runs on.

use crate::error::{KernelError, SuiteError};
use crossbeam_channel::{unbounded, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn spawn_job_loop(
    name: String,
    receiver: crossbeam_channel::Receiver<Job>,
) -> Result<JoinHandle<()>, SuiteError> {
    let thread_name = name.clone();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            while let Ok(job) = receiver.recv() {
                job();
            }
            log::debug!("[POOL] {} exiting", thread_name);
        })
        .map_err(|e| SuiteError::WorkerSpawn(format!("{}: {}", name, e)))
}

/// Fixed-size pool sized to the detected core count.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> Result<Self, SuiteError> {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            workers.push(spawn_job_loop(
                format!("corebench-pool-{}", i),
                receiver.clone(),
            )?);
        }

        log::debug!("[POOL] Started {} workers", size);
        Ok(WorkerPool {
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Run every task on the pool and block until all have finished.
    ///
    /// Results come back in task order. A panicking task does not take its
    /// worker down; the first panic is reported once every task has settled.
    pub fn scatter<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, KernelError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| KernelError::Worker("pool is shut down".to_string()))?;

        let count = tasks.len();
        let (result_tx, result_rx) = crossbeam_channel::bounded(count.max(1));

        for (index, task) in tasks.into_iter().enumerate() {
            let result_tx = result_tx.clone();
            let job: Job = Box::new(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(task));
                let _ = result_tx.send((index, outcome));
            });
            sender
                .send(job)
                .map_err(|_| KernelError::Worker("pool job queue closed".to_string()))?;
        }
        drop(result_tx);

        let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
        let mut first_panic: Option<String> = None;
        for _ in 0..count {
            let (index, outcome) = result_rx
                .recv()
                .map_err(|_| KernelError::Worker("pool worker lost".to_string()))?;
            match outcome {
                Ok(value) => slots[index] = Some(value),
                Err(payload) => {
                    if first_panic.is_none() {
                        first_panic = Some(panic_message(payload));
                    }
                }
            }
        }

        if let Some(msg) = first_panic {
            return Err(KernelError::Panicked(msg));
        }
        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| KernelError::Worker("missing shard result".to_string())))
            .collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Dedicated thread for single-core kernels.
///
/// Jobs run strictly one at a time in submission order. Completion is
/// signalled through a tokio oneshot so async callers can await it.
pub struct PinnedWorker {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl PinnedWorker {
    pub fn spawn() -> Result<Self, SuiteError> {
        let (sender, receiver) = unbounded::<Job>();
        let handle = spawn_job_loop("corebench-single".to_string(), receiver)?;
        Ok(PinnedWorker {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue `task` and return a receiver for its outcome.
    ///
    /// A panic inside `task` is delivered as `Err(message)`. If the worker is
    /// gone the receiver resolves to a `RecvError`.
    pub fn submit<T, F>(&self, task: F) -> tokio::sync::oneshot::Receiver<Result<T, String>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task)).map_err(panic_message);
            let _ = tx.send(outcome);
        });
        if let Some(sender) = &self.sender {
            // On a closed queue the job (and its oneshot sender) is dropped here.
            let _ = sender.send(job);
        }
        rx
    }
}

impl Drop for PinnedWorker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
