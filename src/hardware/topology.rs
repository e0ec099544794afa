//! CPU topology detection and big.LITTLE core classification.
//!
//! Cores are enumerated from the cpu sysfs tree, each core's maximum clock
//! frequency is read from `cpufreq/cpuinfo_max_freq` (kHz), and the observed
//! distinct frequencies decide the LITTLE/MID/BIG split. Detection never fails
//! the caller: missing frequency data yields an unknown topology (no
//! classified cores) which downstream code treats as "run unaffinitized".

use crate::error::TopologyError;
use crate::models::{CoreClass, CpuCore};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Default location of the per-core sysfs tree.
pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

/// Absolute fallback thresholds used when every core reports the same frequency.
pub const UNIFORM_MID_THRESHOLD_HZ: u64 = 2_500_000_000;
pub const UNIFORM_BIG_THRESHOLD_HZ: u64 = 3_000_000_000;

static CPU_DIR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^cpu(\d+)$").expect("Invalid cpu directory regex"));

static TOPOLOGY_CACHE: Lazy<RwLock<Option<Arc<CpuTopology>>>> = Lazy::new(|| RwLock::new(None));

/// Result of a topology probe.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuTopology {
    /// Cores with readable frequency data, classified, sorted by id
    pub cores: Vec<CpuCore>,
    /// Every logical core the host reports, classified or not
    pub present_count: usize,
}

/// Thresholds chosen for a set of frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassBoundaries {
    /// Frequencies below `mid_hz` are LITTLE, at or above `big_hz` are BIG.
    ThreeTier { mid_hz: u64, big_hz: u64 },
    /// Exactly two distinct frequencies: `low_hz` is LITTLE, anything else BIG.
    TwoTier { low_hz: u64 },
}

impl ClassBoundaries {
    /// Derive the split from the observed frequency distribution.
    pub fn from_frequencies(frequencies: &[u64]) -> Self {
        let mut distinct: Vec<u64> = frequencies.to_vec();
        distinct.sort_unstable();
        distinct.dedup();

        match distinct.len() {
            0 | 1 => ClassBoundaries::ThreeTier {
                mid_hz: UNIFORM_MID_THRESHOLD_HZ,
                big_hz: UNIFORM_BIG_THRESHOLD_HZ,
            },
            2 => ClassBoundaries::TwoTier { low_hz: distinct[0] },
            _ => ClassBoundaries::ThreeTier {
                mid_hz: nearest_rank(&distinct, 0.50),
                big_hz: nearest_rank(&distinct, 0.75),
            },
        }
    }

    pub fn classify(&self, frequency_hz: u64) -> CoreClass {
        match *self {
            ClassBoundaries::TwoTier { low_hz } => {
                if frequency_hz <= low_hz {
                    CoreClass::Little
                } else {
                    CoreClass::Big
                }
            }
            ClassBoundaries::ThreeTier { mid_hz, big_hz } => {
                if frequency_hz >= big_hz {
                    CoreClass::Big
                } else if frequency_hz >= mid_hz {
                    CoreClass::Mid
                } else {
                    CoreClass::Little
                }
            }
        }
    }
}

/// Nearest-rank percentile over an ascending, non-empty slice.
fn nearest_rank(sorted: &[u64], percentile: f64) -> u64 {
    let rank = (percentile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Raw per-core reading before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreReading {
    pub id: usize,
    pub max_frequency_hz: Option<u64>,
    pub online: bool,
}

impl CpuTopology {
    /// Topology with no classified cores.
    pub fn unknown(present_count: usize) -> Self {
        CpuTopology {
            cores: Vec::new(),
            present_count,
        }
    }

    /// Classify raw readings. Cores without a frequency are counted but not classified.
    pub fn from_readings(mut readings: Vec<CoreReading>) -> Self {
        readings.sort_by_key(|r| r.id);
        let present_count = readings.len();

        let frequencies: Vec<u64> = readings.iter().filter_map(|r| r.max_frequency_hz).collect();
        if frequencies.is_empty() {
            return CpuTopology::unknown(present_count);
        }

        let boundaries = ClassBoundaries::from_frequencies(&frequencies);
        let cores = readings
            .into_iter()
            .filter_map(|r| {
                r.max_frequency_hz.map(|hz| CpuCore {
                    id: r.id,
                    max_frequency_hz: hz,
                    online: r.online,
                    core_class: boundaries.classify(hz),
                })
            })
            .collect();

        CpuTopology {
            cores,
            present_count,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.cores.is_empty()
    }

    pub fn count_class(&self, class: CoreClass) -> usize {
        self.cores.iter().filter(|c| c.core_class == class).count()
    }

    /// Online cores classified BIG, ascending by id.
    pub fn big_cores(&self) -> impl Iterator<Item = &CpuCore> {
        self.cores
            .iter()
            .filter(|c| c.online && c.core_class == CoreClass::Big)
    }

    /// Highest-numbered online core among the classified cores.
    pub fn highest_core(&self) -> Option<&CpuCore> {
        self.cores.iter().filter(|c| c.online).max_by_key(|c| c.id)
    }
}

/// Reads the cpu sysfs tree. The root is injectable so tests can fake it.
pub struct TopologyDetector {
    sysfs_root: PathBuf,
}

impl TopologyDetector {
    pub fn new() -> Self {
        TopologyDetector {
            sysfs_root: PathBuf::from(SYSFS_CPU_ROOT),
        }
    }

    pub fn with_sysfs_root<P: Into<PathBuf>>(root: P) -> Self {
        TopologyDetector {
            sysfs_root: root.into(),
        }
    }

    /// Probe the host. Degrades to an unknown topology instead of failing.
    pub fn detect(&self) -> CpuTopology {
        match self.read_cores() {
            Ok(readings) => {
                let topology = CpuTopology::from_readings(readings);
                if topology.is_unknown() {
                    log::warn!(
                        "[TOPOLOGY] No frequency data under {}; running unaffinitized ({} cores present)",
                        self.sysfs_root.display(),
                        topology.present_count
                    );
                } else {
                    log::info!(
                        "[TOPOLOGY] {} present, {} classified: {} BIG / {} MID / {} LITTLE",
                        topology.present_count,
                        topology.cores.len(),
                        topology.count_class(CoreClass::Big),
                        topology.count_class(CoreClass::Mid),
                        topology.count_class(CoreClass::Little)
                    );
                }
                topology
            }
            Err(e) => {
                let present = num_cpus::get();
                log::warn!(
                    "[TOPOLOGY] Detection degraded ({}); assuming {} unclassified cores",
                    e,
                    present
                );
                CpuTopology::unknown(present)
            }
        }
    }

    /// Enumerate `cpuN` directories and read each core's frequency and online flag.
    pub fn read_cores(&self) -> Result<Vec<CoreReading>, TopologyError> {
        if !self.sysfs_root.is_dir() {
            return Err(TopologyError::SysfsMissing(
                self.sysfs_root.display().to_string(),
            ));
        }

        let mut readings = Vec::new();
        for entry in fs::read_dir(&self.sysfs_root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(caps) = file_name.to_str().and_then(|n| CPU_DIR_REGEX.captures(n)) else {
                continue;
            };
            let Ok(id) = caps[1].parse::<usize>() else {
                continue;
            };

            let dir = entry.path();
            let max_frequency_hz = match read_max_frequency_hz(&dir, id) {
                Ok(hz) => Some(hz),
                Err(e) => {
                    log::debug!("[TOPOLOGY] cpu{} excluded from classification: {}", id, e);
                    None
                }
            };

            readings.push(CoreReading {
                id,
                max_frequency_hz,
                online: read_online(&dir),
            });
        }

        if readings.is_empty() {
            return Err(TopologyError::NoCores);
        }
        Ok(readings)
    }
}

impl Default for TopologyDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn read_max_frequency_hz(cpu_dir: &Path, core: usize) -> Result<u64, TopologyError> {
    let raw = fs::read_to_string(cpu_dir.join("cpufreq").join("cpuinfo_max_freq"))?;
    let khz = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| TopologyError::FrequencyParse {
            core,
            reason: e.to_string(),
        })?;
    if khz == 0 {
        return Err(TopologyError::FrequencyParse {
            core,
            reason: "zero frequency".to_string(),
        });
    }
    Ok(khz * 1000)
}

/// cpu0 usually has no `online` file; absence means online.
fn read_online(cpu_dir: &Path) -> bool {
    match fs::read_to_string(cpu_dir.join("online")) {
        Ok(raw) => raw.trim() != "0",
        Err(_) => true,
    }
}

/// Process-wide memoized topology. The first call probes the host.
pub fn detect_topology() -> Arc<CpuTopology> {
    if let Some(cached) = TOPOLOGY_CACHE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
    {
        return Arc::clone(cached);
    }

    let mut guard = TOPOLOGY_CACHE.write().unwrap_or_else(|e| e.into_inner());
    if let Some(cached) = guard.as_ref() {
        return Arc::clone(cached);
    }
    let topology = Arc::new(TopologyDetector::new().detect());
    *guard = Some(Arc::clone(&topology));
    topology
}

/// Explicitly replace the cached topology with a fresh probe.
pub fn redetect_topology() -> Arc<CpuTopology> {
    let topology = Arc::new(TopologyDetector::new().detect());
    *TOPOLOGY_CACHE.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&topology));
    log::info!("[TOPOLOGY] Topology cache refreshed");
    topology
}

/// CPU brand string and current per-core clocks (MHz), for reports only.
pub fn cpu_brand_and_clocks() -> (String, Vec<u64>) {
    use sysinfo::{CpuRefreshKind, RefreshKind, System};

    let sys = System::new_with_specifics(
        RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_frequency()),
    );
    let brand = sys
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let clocks = sys.cpus().iter().map(|cpu| cpu.frequency()).collect();
    (brand, clocks)
}
