//! Topology detection against a fake sysfs tree, and the affinity decisions
//! that depend on it.

use corebench::hardware::{
    detect_topology, redetect_topology, AffinityController, ClassBoundaries, CoreReading,
    CpuTopology, SchedulerControl, TopologyDetector,
};
use corebench::models::CoreClass;
use corebench::AffinityError;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Write `cpuN/cpufreq/cpuinfo_max_freq` (kHz) and an optional `online` flag.
fn fake_cpu(root: &Path, id: usize, max_khz: Option<&str>, online: Option<&str>) {
    let dir = root.join(format!("cpu{}", id));
    fs::create_dir_all(&dir).unwrap();
    if let Some(khz) = max_khz {
        fs::create_dir_all(dir.join("cpufreq")).unwrap();
        fs::write(dir.join("cpufreq").join("cpuinfo_max_freq"), format!("{}\n", khz)).unwrap();
    }
    if let Some(flag) = online {
        fs::write(dir.join("online"), flag).unwrap();
    }
}

fn classes(topology: &CpuTopology) -> Vec<(usize, CoreClass)> {
    topology.cores.iter().map(|c| (c.id, c.core_class)).collect()
}

// ============================================================================
// SYSFS PARSING
// ============================================================================

#[test]
fn test_three_cluster_soc_is_split_by_median_and_p75() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    // 4 x 1.8 GHz, 3 x 2.4 GHz, 1 x 3.2 GHz; plus unrelated entries.
    for id in 0..4 {
        fake_cpu(root, id, Some("1800000"), None);
    }
    for id in 4..7 {
        fake_cpu(root, id, Some("2400000"), None);
    }
    fake_cpu(root, 7, Some("3200000"), None);
    fs::create_dir_all(root.join("cpufreq")).unwrap();
    fs::create_dir_all(root.join("cpuidle")).unwrap();
    fs::write(root.join("possible"), "0-7").unwrap();

    let topology = TopologyDetector::with_sysfs_root(root).detect();

    eprintln!("[TEST] classes: {:?}", classes(&topology));
    assert_eq!(topology.present_count, 8);
    assert_eq!(topology.cores.len(), 8);
    // Distinct: [1.8, 2.4, 3.2] -> median 2.4 (MID), p75 3.2 (BIG).
    assert_eq!(topology.count_class(CoreClass::Little), 4);
    assert_eq!(topology.count_class(CoreClass::Mid), 3);
    assert_eq!(topology.count_class(CoreClass::Big), 1);
    assert_eq!(topology.cores[7].max_frequency_hz, 3_200_000_000);
}

#[test]
fn test_two_frequencies_have_no_mid_tier() {
    let temp_dir = TempDir::new().unwrap();
    for id in 0..4 {
        fake_cpu(temp_dir.path(), id, Some("1700000"), None);
    }
    for id in 4..8 {
        fake_cpu(temp_dir.path(), id, Some("2800000"), None);
    }

    let topology = TopologyDetector::with_sysfs_root(temp_dir.path()).detect();
    assert_eq!(topology.count_class(CoreClass::Little), 4);
    assert_eq!(topology.count_class(CoreClass::Mid), 0);
    assert_eq!(topology.count_class(CoreClass::Big), 4);
}

#[test]
fn test_uniform_frequency_uses_fixed_thresholds() {
    let temp_dir = TempDir::new().unwrap();
    for id in 0..4 {
        fake_cpu(temp_dir.path(), id, Some("2600000"), None);
    }

    let topology = TopologyDetector::with_sysfs_root(temp_dir.path()).detect();
    // 2.6 GHz sits between the 2.5 GHz and 3.0 GHz thresholds.
    assert!(topology.cores.iter().all(|c| c.core_class == CoreClass::Mid));
}

#[test]
fn test_unreadable_core_is_present_but_unclassified() {
    let temp_dir = TempDir::new().unwrap();
    fake_cpu(temp_dir.path(), 0, Some("2000000"), None);
    fake_cpu(temp_dir.path(), 1, Some("garbage"), None);
    fake_cpu(temp_dir.path(), 2, None, None);
    fake_cpu(temp_dir.path(), 3, Some("0"), None);

    let topology = TopologyDetector::with_sysfs_root(temp_dir.path()).detect();
    assert_eq!(topology.present_count, 4);
    assert_eq!(topology.cores.len(), 1);
    assert_eq!(topology.cores[0].id, 0);
}

#[test]
fn test_offline_flag_is_read() {
    let temp_dir = TempDir::new().unwrap();
    fake_cpu(temp_dir.path(), 0, Some("2000000"), None);
    fake_cpu(temp_dir.path(), 1, Some("3000000"), Some("0\n"));

    let topology = TopologyDetector::with_sysfs_root(temp_dir.path()).detect();
    assert!(topology.cores[0].online, "missing online file means online");
    assert!(!topology.cores[1].online);
    assert_eq!(topology.big_cores().count(), 0);
}

#[test]
fn test_no_frequency_data_is_unknown_topology() {
    let temp_dir = TempDir::new().unwrap();
    for id in 0..6 {
        fake_cpu(temp_dir.path(), id, None, None);
    }

    let topology = TopologyDetector::with_sysfs_root(temp_dir.path()).detect();
    assert!(topology.is_unknown());
    assert_eq!(topology.present_count, 6);
}

#[test]
fn test_missing_sysfs_degrades_without_panicking() {
    let temp_dir = TempDir::new().unwrap();
    let detector = TopologyDetector::with_sysfs_root(temp_dir.path().join("absent"));

    assert!(detector.read_cores().is_err());
    let topology = detector.detect();
    assert!(topology.is_unknown());
    assert!(topology.present_count >= 1, "falls back to the logical cpu count");
}

#[test]
fn test_boundaries_ignore_duplicate_frequencies() {
    let mostly_little = [1_000, 1_000, 1_000, 1_000, 1_000, 2_000, 3_000];
    let boundaries = ClassBoundaries::from_frequencies(&mostly_little);
    assert_eq!(
        boundaries,
        ClassBoundaries::ThreeTier {
            mid_hz: 2_000,
            big_hz: 3_000
        }
    );
}

// ============================================================================
// PIN TARGET SELECTION
// ============================================================================

#[derive(Default)]
struct RecordingScheduler {
    affinity_calls: Mutex<Vec<Vec<usize>>>,
}

impl SchedulerControl for RecordingScheduler {
    fn set_affinity(&self, cores: &[usize]) -> Result<(), AffinityError> {
        self.affinity_calls.lock().unwrap().push(cores.to_vec());
        Ok(())
    }

    fn current_affinity(&self) -> Result<Vec<usize>, AffinityError> {
        Ok(vec![0, 1, 2, 3])
    }

    fn get_priority(&self) -> Result<i32, AffinityError> {
        Ok(0)
    }

    fn set_priority(&self, _nice: i32) -> Result<(), AffinityError> {
        Ok(())
    }
}

fn reading(id: usize, mhz: u64) -> CoreReading {
    CoreReading {
        id,
        max_frequency_hz: Some(mhz * 1_000_000),
        online: true,
    }
}

#[test]
fn test_pin_target_prefers_big_core_over_highest_id() {
    // The fast cluster is numbered first on this layout.
    let topology = CpuTopology::from_readings(vec![
        reading(0, 3000),
        reading(1, 3000),
        reading(2, 1800),
        reading(3, 1800),
    ]);
    let scheduler = Arc::new(RecordingScheduler::default());
    let controller = AffinityController::with_scheduler(&topology, scheduler.clone());

    assert_eq!(controller.target_core(), Some(1));
    {
        let guard = controller.pinned_scope();
        assert!(guard.is_pinned());
    }
    let calls = scheduler.affinity_calls.lock().unwrap();
    assert_eq!(calls[0], vec![1]);
    assert_eq!(calls[1], vec![0, 1, 2, 3], "released to every present core");
}

#[test]
fn test_unknown_topology_runs_unaffinitized() {
    let scheduler = Arc::new(RecordingScheduler::default());
    let controller = AffinityController::with_scheduler(&CpuTopology::unknown(4), scheduler.clone());

    assert_eq!(controller.target_core(), None);
    let guard = controller.pinned_scope();
    assert!(!guard.is_pinned());
    assert!(guard.is_boosted());
    drop(guard);
    assert!(scheduler.affinity_calls.lock().unwrap().is_empty());
}

// ============================================================================
// PROCESS CACHE
// ============================================================================

// The only test in this binary that touches the process-wide cache.
#[test]
fn test_topology_is_memoized_until_redetected() {
    let first = detect_topology();
    let second = detect_topology();
    assert!(Arc::ptr_eq(&first, &second), "repeat detection must reuse the cache");

    let refreshed = redetect_topology();
    assert!(!Arc::ptr_eq(&first, &refreshed));
    assert_eq!(refreshed.present_count, first.present_count);

    let after = detect_topology();
    assert!(Arc::ptr_eq(&after, &refreshed), "re-detection must replace the cache");
    eprintln!("[TEST] cached topology: {} present cores", after.present_count);
}
