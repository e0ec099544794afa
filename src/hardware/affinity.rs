//! Thread placement and scheduling priority for measured kernels.
//!
//! `AffinityController` decides once, at construction, whether native core
//! pinning works on this host (`AffinityCapability`). Pinning and boosting are
//! only ever acquired through an `AffinityGuard`, which undoes both on drop,
//! including during panic unwind.

use crate::error::AffinityError;
use crate::hardware::topology::CpuTopology;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Highest non-realtime priority (nice value) requested while a kernel runs.
pub const BOOST_NICE: i32 = -20;

/// Scheduler operations applied to the calling thread.
pub trait SchedulerControl: Send + Sync {
    /// Restrict the calling thread to `cores`.
    fn set_affinity(&self, cores: &[usize]) -> Result<(), AffinityError>;

    /// Cores the calling thread may currently run on.
    fn current_affinity(&self) -> Result<Vec<usize>, AffinityError>;

    /// Current nice value of the calling thread.
    fn get_priority(&self) -> Result<i32, AffinityError>;

    fn set_priority(&self, nice: i32) -> Result<(), AffinityError>;
}

/// Native implementation backed by `sched_setaffinity` and `setpriority`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeScheduler;

#[cfg(any(target_os = "linux", target_os = "android"))]
impl SchedulerControl for NativeScheduler {
    fn set_affinity(&self, cores: &[usize]) -> Result<(), AffinityError> {
        use nix::sched::{sched_setaffinity, CpuSet};
        use nix::unistd::Pid;

        let mut cpu_set = CpuSet::new();
        for &core in cores {
            cpu_set
                .set(core)
                .map_err(|_| AffinityError::CoreOutOfRange {
                    core,
                    present: CpuSet::count(),
                })?;
        }

        sched_setaffinity(Pid::from_raw(0), &cpu_set).map_err(|e| AffinityError::Syscall {
            op: "sched_setaffinity",
            reason: e.to_string(),
        })
    }

    fn current_affinity(&self) -> Result<Vec<usize>, AffinityError> {
        use nix::sched::{sched_getaffinity, CpuSet};
        use nix::unistd::Pid;

        let cpu_set = sched_getaffinity(Pid::from_raw(0)).map_err(|e| AffinityError::Syscall {
            op: "sched_getaffinity",
            reason: e.to_string(),
        })?;

        Ok((0..CpuSet::count())
            .filter(|&core| cpu_set.is_set(core).unwrap_or(false))
            .collect())
    }

    fn get_priority(&self) -> Result<i32, AffinityError> {
        // getpriority can legitimately return -1, so errno must be checked.
        nix::errno::Errno::clear();
        let nice = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
        if nice == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error().unwrap_or(0) != 0 {
                return Err(AffinityError::Syscall {
                    op: "getpriority",
                    reason: err.to_string(),
                });
            }
        }
        Ok(nice)
    }

    fn set_priority(&self, nice: i32) -> Result<(), AffinityError> {
        let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
        if ret != 0 {
            return Err(AffinityError::Syscall {
                op: "setpriority",
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl SchedulerControl for NativeScheduler {
    fn set_affinity(&self, _cores: &[usize]) -> Result<(), AffinityError> {
        Err(AffinityError::Unsupported(
            "no core affinity binding for this platform".to_string(),
        ))
    }

    fn current_affinity(&self) -> Result<Vec<usize>, AffinityError> {
        Err(AffinityError::Unsupported(
            "no core affinity binding for this platform".to_string(),
        ))
    }

    fn get_priority(&self) -> Result<i32, AffinityError> {
        Err(AffinityError::Unsupported(
            "no priority binding for this platform".to_string(),
        ))
    }

    fn set_priority(&self, _nice: i32) -> Result<(), AffinityError> {
        Err(AffinityError::Unsupported(
            "no priority binding for this platform".to_string(),
        ))
    }
}

/// Outcome of the one-time pinning probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffinityCapability {
    Supported,
    Unsupported { reason: String },
}

impl AffinityCapability {
    pub fn is_supported(&self) -> bool {
        matches!(self, AffinityCapability::Supported)
    }
}

/// Positions the calling thread for single-core and multi-core phases.
pub struct AffinityController {
    scheduler: Arc<dyn SchedulerControl>,
    capability: AffinityCapability,
    target_core: Option<usize>,
    release_mask: Vec<usize>,
    boost_warned: AtomicBool,
}

impl AffinityController {
    /// Controller backed by the host scheduler.
    pub fn new(topology: &CpuTopology) -> Self {
        Self::with_scheduler(topology, Arc::new(NativeScheduler))
    }

    /// Controller with an injected scheduler. Probes capability exactly once.
    pub fn with_scheduler(topology: &CpuTopology, scheduler: Arc<dyn SchedulerControl>) -> Self {
        // The mask seen at probe time is what "release" restores, so a
        // process started under `taskset` stays inside its allowed set.
        let (capability, release_mask) = match scheduler.current_affinity() {
            Ok(cores) if !cores.is_empty() => (AffinityCapability::Supported, cores),
            Ok(_) => (
                AffinityCapability::Unsupported {
                    reason: "empty affinity mask reported".to_string(),
                },
                Vec::new(),
            ),
            Err(e) => (
                AffinityCapability::Unsupported {
                    reason: e.to_string(),
                },
                Vec::new(),
            ),
        };

        let target_core = select_target_core(topology);

        match (&capability, target_core) {
            (AffinityCapability::Supported, Some(core)) => {
                log::info!("[AFFINITY] Core pinning available; single-core target is cpu{}", core);
            }
            (AffinityCapability::Supported, None) => {
                log::warn!("[AFFINITY] Topology unknown; single-core kernels run unaffinitized");
            }
            (AffinityCapability::Unsupported { reason }, _) => {
                log::warn!(
                    "[AFFINITY] Core pinning unavailable ({}); degraded to priority-only mode",
                    reason
                );
            }
        }

        AffinityController {
            scheduler,
            capability,
            target_core,
            release_mask,
            boost_warned: AtomicBool::new(false),
        }
    }

    pub fn capability(&self) -> &AffinityCapability {
        &self.capability
    }

    /// Core selected for single-core phases, if any.
    pub fn target_core(&self) -> Option<usize> {
        self.target_core
    }

    pub fn current_affinity(&self) -> Result<Vec<usize>, AffinityError> {
        self.scheduler.current_affinity()
    }

    /// Pin the calling thread to the selected core. Returns whether pinning took effect.
    ///
    /// Never fails the caller: an unsupported host or a failing syscall leaves
    /// the thread unpinned and the run continues with the priority boost alone.
    pub fn pin_to_fastest_core(&self) -> bool {
        if !self.capability.is_supported() {
            return false;
        }
        let Some(core) = self.target_core else {
            return false;
        };

        match self.scheduler.set_affinity(&[core]) {
            Ok(()) => {
                log::debug!("[AFFINITY] Pinned to cpu{}", core);
                true
            }
            Err(e) => {
                log::warn!(
                    "[AFFINITY] Pinning to cpu{} failed ({}); continuing with priority boost only",
                    core,
                    e
                );
                false
            }
        }
    }

    /// Cores a released thread may run on: the mask observed at construction.
    pub fn release_mask(&self) -> &[usize] {
        &self.release_mask
    }

    /// Let the calling thread run on every core it was originally allowed.
    /// No-op when pinning is unsupported.
    pub fn release_affinity(&self) {
        if !self.capability.is_supported() || self.release_mask.is_empty() {
            return;
        }
        if let Err(e) = self.scheduler.set_affinity(&self.release_mask) {
            log::warn!(
                "[AFFINITY] Failed to reset affinity to {:?}: {}",
                self.release_mask,
                e
            );
        }
    }

    /// Raise the calling thread's priority. Returns the value to restore, if the boost applied.
    pub fn boost_priority(&self) -> Option<i32> {
        let previous = match self.scheduler.get_priority() {
            Ok(nice) => nice,
            Err(e) => {
                self.warn_boost_once(&e);
                return None;
            }
        };
        if previous == BOOST_NICE {
            return Some(previous);
        }
        match self.scheduler.set_priority(BOOST_NICE) {
            Ok(()) => Some(previous),
            Err(e) => {
                self.warn_boost_once(&e);
                None
            }
        }
    }

    pub fn restore_priority(&self, previous: i32) {
        if let Err(e) = self.scheduler.set_priority(previous) {
            log::warn!("[AFFINITY] Failed to restore priority to {}: {}", previous, e);
        }
    }

    fn warn_boost_once(&self, err: &AffinityError) {
        if !self.boost_warned.swap(true, Ordering::Relaxed) {
            log::warn!("[AFFINITY] Priority boost unavailable: {}", err);
        }
    }

    /// Pin to the selected core and boost priority until the guard drops.
    pub fn pinned_scope(&self) -> AffinityGuard<'_> {
        let pinned = self.pin_to_fastest_core();
        let previous_priority = self.boost_priority();
        AffinityGuard {
            controller: self,
            pinned,
            previous_priority,
        }
    }

    /// Release to all cores and boost priority until the guard drops.
    pub fn unpinned_scope(&self) -> AffinityGuard<'_> {
        self.release_affinity();
        let previous_priority = self.boost_priority();
        AffinityGuard {
            controller: self,
            pinned: false,
            previous_priority,
        }
    }
}

/// Prefer the highest-numbered online BIG core; fall back to the highest id.
fn select_target_core(topology: &CpuTopology) -> Option<usize> {
    topology
        .big_cores()
        .map(|c| c.id)
        .max()
        .or_else(|| topology.highest_core().map(|c| c.id))
}

/// Scoped acquisition of placement and priority.
pub struct AffinityGuard<'a> {
    controller: &'a AffinityController,
    pinned: bool,
    previous_priority: Option<i32>,
}

impl AffinityGuard<'_> {
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn is_boosted(&self) -> bool {
        self.previous_priority.is_some()
    }
}

impl Drop for AffinityGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous_priority.take() {
            self.controller.restore_priority(previous);
        }
        if self.pinned {
            self.controller.release_affinity();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::topology::{CoreReading, CpuTopology};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeScheduler {
        calls: Mutex<Vec<String>>,
        nice: Mutex<i32>,
        fail_affinity: bool,
        allowed: Option<Vec<usize>>,
    }

    impl SchedulerControl for FakeScheduler {
        fn set_affinity(&self, cores: &[usize]) -> Result<(), AffinityError> {
            self.calls.lock().unwrap().push(format!("affinity {:?}", cores));
            if self.fail_affinity {
                return Err(AffinityError::Syscall {
                    op: "sched_setaffinity",
                    reason: "EPERM".to_string(),
                });
            }
            Ok(())
        }

        fn current_affinity(&self) -> Result<Vec<usize>, AffinityError> {
            Ok(self.allowed.clone().unwrap_or_else(|| vec![0, 1, 2, 3]))
        }

        fn get_priority(&self) -> Result<i32, AffinityError> {
            Ok(*self.nice.lock().unwrap())
        }

        fn set_priority(&self, nice: i32) -> Result<(), AffinityError> {
            self.calls.lock().unwrap().push(format!("nice {}", nice));
            *self.nice.lock().unwrap() = nice;
            Ok(())
        }
    }

    fn big_little() -> CpuTopology {
        CpuTopology::from_readings(vec![
            CoreReading { id: 0, max_frequency_hz: Some(1_800_000_000), online: true },
            CoreReading { id: 1, max_frequency_hz: Some(1_800_000_000), online: true },
            CoreReading { id: 2, max_frequency_hz: Some(2_900_000_000), online: true },
            CoreReading { id: 3, max_frequency_hz: Some(1_800_000_000), online: true },
        ])
    }

    #[test]
    fn test_target_prefers_big_core_over_highest_id() {
        let controller =
            AffinityController::with_scheduler(&big_little(), Arc::new(FakeScheduler::default()));
        assert_eq!(controller.target_core(), Some(2));
    }

    #[test]
    fn test_unknown_topology_has_no_target() {
        let controller = AffinityController::with_scheduler(
            &CpuTopology::unknown(4),
            Arc::new(FakeScheduler::default()),
        );
        assert_eq!(controller.target_core(), None);
        assert!(!controller.pin_to_fastest_core());
    }

    #[test]
    fn test_guard_restores_priority_and_affinity() {
        let scheduler = Arc::new(FakeScheduler::default());
        let controller = AffinityController::with_scheduler(&big_little(), scheduler.clone());
        {
            let guard = controller.pinned_scope();
            assert!(guard.is_pinned());
            assert!(guard.is_boosted());
            assert_eq!(*scheduler.nice.lock().unwrap(), BOOST_NICE);
        }
        assert_eq!(*scheduler.nice.lock().unwrap(), 0);
        let calls = scheduler.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "affinity [2]".to_string(),
                "nice -20".to_string(),
                "nice 0".to_string(),
                "affinity [0, 1, 2, 3]".to_string(),
            ]
        );
    }

    #[test]
    fn test_pin_failure_degrades_to_priority_only() {
        let scheduler = Arc::new(FakeScheduler {
            fail_affinity: true,
            ..Default::default()
        });
        let controller = AffinityController::with_scheduler(&big_little(), scheduler.clone());
        let guard = controller.pinned_scope();
        assert!(!guard.is_pinned());
        assert!(guard.is_boosted());
    }

    #[test]
    fn test_release_restores_inherited_mask() {
        // Started under `taskset -c 4-7`: four present cores, none numbered 0-3.
        let scheduler = Arc::new(FakeScheduler {
            allowed: Some(vec![4, 5, 6, 7]),
            ..Default::default()
        });
        let controller =
            AffinityController::with_scheduler(&CpuTopology::unknown(4), scheduler.clone());
        assert_eq!(controller.release_mask(), &[4, 5, 6, 7]);

        drop(controller.unpinned_scope());

        let calls = scheduler.calls.lock().unwrap().clone();
        assert_eq!(calls[0], "affinity [4, 5, 6, 7]");
        assert!(!calls.iter().any(|c| c == "affinity [0, 1, 2, 3]"));
    }

    #[test]
    fn test_guard_restores_after_panic() {
        let scheduler = Arc::new(FakeScheduler::default());
        let controller = AffinityController::with_scheduler(&big_little(), scheduler.clone());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = controller.pinned_scope();
            panic!("kernel blew up");
        }));

        assert!(outcome.is_err());
        assert_eq!(*scheduler.nice.lock().unwrap(), 0);
        let calls = scheduler.calls.lock().unwrap().clone();
        assert_eq!(calls.last().map(String::as_str), Some("affinity [0, 1, 2, 3]"));
    }
}
