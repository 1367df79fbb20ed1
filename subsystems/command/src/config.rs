//! Container sizing

use forge_core::types::memory_constants::{
    CACHE_LINE_SIZE, KILOBYTE, MEGABYTE, PAGE_SIZE, PAGE_SIZE_64K,
};

/// Bytes the command streamer may prefetch past the last command
pub const CS_PREFETCH_SIZE: usize = 4 * KILOBYTE;

/// Sizes and policies of one command stream container
#[derive(Debug, Clone)]
pub struct CommandContainerConfig {
    /// Writable bytes of one command buffer
    pub default_cmd_buffer_size: usize,
    /// Trailer kept free for the epilogue and prefetch overrun
    pub cmd_buffer_reserved_size: usize,
    /// Command buffer allocation alignment
    pub cmd_buffer_alignment: usize,
    /// Capacity of a freshly created heap region
    pub default_heap_size: usize,
    /// Heap capacities are rounded up to this
    pub heap_growth_granularity: usize,
    /// Heap allocation alignment
    pub heap_alignment: usize,
    /// Initial capacity of the residency set
    pub starting_residency_container_size: usize,
    /// Interface descriptors carved per DSH block
    pub num_idd_per_block: u32,
    /// Command buffers pre-populated by `fill_reusable_allocation_lists`
    pub allocations_to_fill: usize,
}

impl CommandContainerConfig {
    /// Size of one command buffer allocation before alignment
    pub const fn total_cmd_buffer_size(&self) -> usize {
        self.default_cmd_buffer_size + self.cmd_buffer_reserved_size
    }
}

impl Default for CommandContainerConfig {
    fn default() -> Self {
        Self {
            default_cmd_buffer_size: MEGABYTE,
            cmd_buffer_reserved_size: CACHE_LINE_SIZE + CS_PREFETCH_SIZE,
            cmd_buffer_alignment: PAGE_SIZE_64K,
            default_heap_size: 64 * KILOBYTE,
            heap_growth_granularity: PAGE_SIZE,
            heap_alignment: PAGE_SIZE_64K,
            starting_residency_container_size: 128,
            num_idd_per_block: 64,
            allocations_to_fill: 1,
        }
    }
}
