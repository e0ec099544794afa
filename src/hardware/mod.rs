//! Hardware awareness: core topology and thread placement.
//!
//! `topology` classifies the host's cores into LITTLE/MID/BIG and caches the
//! result process-wide; `affinity` uses that classification to position the
//! calling thread for each benchmark phase.

pub mod affinity;
pub mod topology;

pub use affinity::{
    AffinityCapability, AffinityController, AffinityGuard, NativeScheduler, SchedulerControl,
};
pub use topology::{
    cpu_brand_and_clocks, detect_topology, redetect_topology, ClassBoundaries, CoreReading,
    CpuTopology, TopologyDetector,
};
