//! # Graphics Allocations
//!
//! A block of GPU-visible memory with a CPU mapping.

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;

use forge_core::{GpuAddr, Handle};

// =============================================================================
// ALLOCATION TYPE
// =============================================================================

/// What an allocation is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationType {
    /// Batch buffer the command streamer executes
    CommandBuffer,
    /// Dynamic/surface state heap, or indirect object heap outside the 4GB window
    LinearStream,
    /// Instruction heap, or indirect object heap inside the 4GB window
    InternalHeap,
    /// Pool storage for timestamp packet tags
    TimestampPacketTagBuffer,
    /// User buffer
    Buffer,
}

bitflags::bitflags! {
    /// Allocation usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AllocationFlags: u32 {
        /// Must stay resident for the whole context lifetime
        const ALWAYS_RESIDENT = 1 << 0;
        /// CPU writes go straight to memory
        const UNCACHED = 1 << 1;
        /// Lives in device local memory
        const LOCAL_MEMORY = 1 << 2;
    }
}

// =============================================================================
// ALLOCATION PROPERTIES
// =============================================================================

/// Allocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationProperties {
    /// Size in bytes
    pub size: usize,
    /// Power-of-two alignment of the GPU address
    pub alignment: usize,
    /// Usage
    pub allocation_type: AllocationType,
    /// Usage flags
    pub flags: AllocationFlags,
}

impl AllocationProperties {
    /// Request with default flags
    pub const fn new(size: usize, alignment: usize, allocation_type: AllocationType) -> Self {
        Self {
            size,
            alignment,
            allocation_type,
            flags: AllocationFlags::empty(),
        }
    }
}

// =============================================================================
// GRAPHICS ALLOCATION
// =============================================================================

/// Allocation identifier, used for residency bookkeeping
pub type AllocationId = Handle<GraphicsAllocation>;

/// GPU-visible memory with a CPU mapping
///
/// Not `Clone`: exactly one owner at a time.
pub struct GraphicsAllocation {
    id: AllocationId,
    allocation_type: AllocationType,
    flags: AllocationFlags,
    gpu_address: GpuAddr,
    memory: Box<[u8]>,
    /// Task count of the last submission that used this allocation
    task_count: u64,
}

impl GraphicsAllocation {
    /// Wrap freshly mapped memory. Called by memory managers.
    pub fn new(
        id: AllocationId,
        properties: &AllocationProperties,
        gpu_address: GpuAddr,
        size: usize,
    ) -> Self {
        Self {
            id,
            allocation_type: properties.allocation_type,
            flags: properties.flags,
            gpu_address,
            memory: vec![0u8; size].into_boxed_slice(),
            task_count: 0,
        }
    }

    /// Identifier
    #[inline]
    pub fn id(&self) -> AllocationId {
        self.id
    }

    /// Usage
    #[inline]
    pub fn allocation_type(&self) -> AllocationType {
        self.allocation_type
    }

    /// Usage flags
    #[inline]
    pub fn flags(&self) -> AllocationFlags {
        self.flags
    }

    /// GPU address of the first byte
    #[inline]
    pub fn gpu_address(&self) -> GpuAddr {
        self.gpu_address
    }

    /// Size of the underlying buffer
    #[inline]
    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// CPU view
    #[inline]
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Mutable CPU view
    #[inline]
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Task count of the last submission using this allocation
    #[inline]
    pub fn task_count(&self) -> u64 {
        self.task_count
    }

    /// Record the submission that last used this allocation
    #[inline]
    pub fn update_task_count(&mut self, task_count: u64) {
        self.task_count = task_count;
    }

    /// Whether all work using this allocation has completed
    #[inline]
    pub fn is_completed(&self, completed_task_count: u64) -> bool {
        self.task_count <= completed_task_count
    }
}

impl fmt::Debug for GraphicsAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsAllocation")
            .field("id", &self.id.id())
            .field("type", &self.allocation_type)
            .field("gpu_address", &self.gpu_address)
            .field("size", &self.memory.len())
            .field("task_count", &self.task_count)
            .finish()
    }
}
