//! # Hardware Modes
//!
//! Small value types shared by the capability tables and the state tracker.

// =============================================================================
// THREAD ARBITRATION
// =============================================================================

/// EU thread arbitration policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ThreadArbitrationPolicy {
    /// Oldest thread first
    AgeBased = 0,
    /// Round robin
    RoundRobin = 1,
    /// Round robin, stalling on dependencies
    RoundRobinAfterDependency = 2,
}

impl ThreadArbitrationPolicy {
    /// Decode a raw debug-setting value
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::AgeBased),
            1 => Some(Self::RoundRobin),
            2 => Some(Self::RoundRobinAfterDependency),
            _ => None,
        }
    }
}

// =============================================================================
// PREEMPTION
// =============================================================================

/// Device preemption granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum PreemptionMode {
    /// Not yet decided
    Initial = 0,
    /// Preemption disabled
    Disabled = 1,
    /// Between batch buffer commands
    MidBatch = 2,
    /// Between thread groups
    ThreadGroup = 3,
    /// Inside a running thread
    MidThread = 4,
}

// =============================================================================
// GRF CONFIG
// =============================================================================

/// General register file sizes a kernel can request
pub struct GrfConfig;

impl GrfConfig {
    /// Kernel carries no GRF requirement
    pub const NOT_APPLICABLE: u32 = 0;
    /// Default register file
    pub const DEFAULT_GRF_NUMBER: u32 = 128;
    /// Large register file mode
    pub const LARGE_GRF_NUMBER: u32 = 256;
}
