//! # Dependency Commands
//!
//! The two commands dependency programming needs. Sizes are associated
//! constants so callers can reserve stream space before emitting anything.

use forge_command::LinearStream;
use forge_core::{CoreFamily, GpuAddr, Result, RootDeviceEnvironment};

/// Semaphore comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CompareOperation {
    /// Memory value greater than data
    SadGreaterThanSdd = 0,
    /// Memory value greater or equal
    SadGreaterThanOrEqualSdd = 1,
    /// Memory value less than data
    SadLessThanSdd = 2,
    /// Memory value less or equal
    SadLessThanOrEqualSdd = 3,
    /// Memory value equal
    SadEqualSdd = 4,
    /// Memory value not equal
    SadNotEqualSdd = 5,
}

/// Post-sync write performed by a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSyncMode {
    /// No write
    NoWrite,
    /// Write an immediate value
    ImmediateData,
    /// Write the timestamp
    Timestamp,
}

/// Per-generation encoding of dependency commands
pub trait DependencyEncoder {
    /// Bytes of one semaphore wait
    const SEMAPHORE_WAIT_SIZE: usize;

    /// Bytes of one barrier with post-sync
    const BARRIER_WITH_POST_SYNC_SIZE: usize;

    /// Block the engine until the dword at `address` compares true
    fn add_semaphore_wait(
        stream: &mut LinearStream,
        address: GpuAddr,
        data: u32,
        operation: CompareOperation,
    ) -> Result<()>;

    /// Full pipeline barrier that writes `immediate_data` to `address` once
    /// everything before it retired
    fn add_barrier_with_post_sync(
        stream: &mut LinearStream,
        mode: PostSyncMode,
        address: GpuAddr,
        immediate_data: u64,
        dc_flush: bool,
    ) -> Result<()>;

    /// Whether barriers on this device flush the data cache
    fn dc_flush_enable(env: &RootDeviceEnvironment) -> bool {
        env.hardware_info().core_family() != CoreFamily::XeHpcCore
    }
}

// =============================================================================
// GEN12LP
// =============================================================================

/// Gen12LP command layouts
#[derive(Debug, Clone, Copy, Default)]
pub struct Gen12LpEncoder;

mod gen12lp {
    /// MI_SEMAPHORE_WAIT, 4 dwords
    pub const MI_SEMAPHORE_WAIT: u32 = (0x1C << 23) | 0x2;
    /// Polling wait mode
    pub const WAIT_MODE_POLLING: u32 = 1 << 15;
    /// PIPE_CONTROL, 6 dwords
    pub const PIPE_CONTROL: u32 = 0x7A00_0004;

    pub const PC_DC_FLUSH_ENABLE: u32 = 1 << 5;
    pub const PC_POST_SYNC_IMMEDIATE: u32 = 1 << 14;
    pub const PC_POST_SYNC_TIMESTAMP: u32 = 3 << 14;
    pub const PC_CS_STALL: u32 = 1 << 20;
}

impl DependencyEncoder for Gen12LpEncoder {
    const SEMAPHORE_WAIT_SIZE: usize = 4 * 4;
    const BARRIER_WITH_POST_SYNC_SIZE: usize = 6 * 4;

    fn add_semaphore_wait(
        stream: &mut LinearStream,
        address: GpuAddr,
        data: u32,
        operation: CompareOperation,
    ) -> Result<()> {
        let raw = address.raw();
        stream.write_dwords(&[
            gen12lp::MI_SEMAPHORE_WAIT | gen12lp::WAIT_MODE_POLLING | ((operation as u32) << 12),
            data,
            raw as u32,
            (raw >> 32) as u32,
        ])
    }

    fn add_barrier_with_post_sync(
        stream: &mut LinearStream,
        mode: PostSyncMode,
        address: GpuAddr,
        immediate_data: u64,
        dc_flush: bool,
    ) -> Result<()> {
        let mut flags = gen12lp::PC_CS_STALL;
        flags |= match mode {
            PostSyncMode::NoWrite => 0,
            PostSyncMode::ImmediateData => gen12lp::PC_POST_SYNC_IMMEDIATE,
            PostSyncMode::Timestamp => gen12lp::PC_POST_SYNC_TIMESTAMP,
        };
        if dc_flush {
            flags |= gen12lp::PC_DC_FLUSH_ENABLE;
        }
        let raw = address.raw();
        stream.write_dwords(&[
            gen12lp::PIPE_CONTROL,
            flags,
            raw as u32,
            (raw >> 32) as u32,
            immediate_data as u32,
            (immediate_data >> 32) as u32,
        ])
    }
}
