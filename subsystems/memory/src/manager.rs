//! # Memory Manager
//!
//! The seam to the OS/driver allocation layer. Command building only ever
//! asks for "N bytes, alignment A, type T" and gets back an owned
//! [`GraphicsAllocation`].

use forge_core::types::{align_up, memory_constants};
use forge_core::{Error, GpuAddr, Result};

use crate::allocation::{AllocationId, AllocationProperties, GraphicsAllocation};

// =============================================================================
// MEMORY MANAGER TRAIT
// =============================================================================

/// Device memory allocation primitives
pub trait MemoryManager: core::fmt::Debug {
    /// Allocate and map memory. Fails with [`Error::OutOfDeviceMemory`].
    fn allocate_graphics_memory(
        &mut self,
        properties: &AllocationProperties,
    ) -> Result<GraphicsAllocation>;

    /// Release memory
    fn free_graphics_memory(&mut self, allocation: GraphicsAllocation);

    /// Base of the 4GB window instruction heaps are addressed from
    fn internal_heap_base_address(&self) -> GpuAddr;
}

// =============================================================================
// SYSTEM MEMORY MANAGER
// =============================================================================

/// Memory manager statistics
#[derive(Debug, Clone, Default)]
pub struct MemoryManagerStats {
    /// Successful allocations
    pub allocations: u64,
    /// Frees
    pub frees: u64,
    /// Failed allocations
    pub failures: u64,
    /// Bytes currently allocated
    pub bytes_in_use: usize,
    /// High water mark
    pub peak_bytes: usize,
}

/// Host-backed memory manager with a bump GPU address space
///
/// An optional byte budget makes exhaustion reproducible.
#[derive(Debug)]
pub struct SystemMemoryManager {
    /// Next free GPU virtual address
    next_gpu_va: u64,
    /// Base of the internal heap window
    internal_heap_base: GpuAddr,
    /// Maximum bytes in use at once
    budget: Option<usize>,
    /// Next allocation ID
    next_id: u64,
    /// Statistics
    stats: MemoryManagerStats,
}

impl SystemMemoryManager {
    /// First GPU address handed out
    pub const GPU_VA_BASE: u64 = 0x0001_0000_0000;

    /// Unlimited manager
    pub fn new() -> Self {
        Self {
            next_gpu_va: Self::GPU_VA_BASE,
            internal_heap_base: GpuAddr::new(Self::GPU_VA_BASE),
            budget: None,
            next_id: 1,
            stats: MemoryManagerStats::default(),
        }
    }

    /// Manager that fails once `budget` bytes are in use
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new()
        }
    }

    /// Change the budget, e.g. to simulate memory pressure mid-test
    pub fn set_budget(&mut self, budget: Option<usize>) {
        self.budget = budget;
    }

    /// Statistics
    pub fn stats(&self) -> &MemoryManagerStats {
        &self.stats
    }
}

impl Default for SystemMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager for SystemMemoryManager {
    fn allocate_graphics_memory(
        &mut self,
        properties: &AllocationProperties,
    ) -> Result<GraphicsAllocation> {
        if properties.size == 0 {
            return Err(Error::InvalidParameter);
        }
        let alignment = properties.alignment.max(memory_constants::PAGE_SIZE);
        if !alignment.is_power_of_two() {
            return Err(Error::MisalignedAddress);
        }
        let size = align_up(properties.size, memory_constants::PAGE_SIZE);

        if let Some(budget) = self.budget {
            if self.stats.bytes_in_use + size > budget {
                self.stats.failures += 1;
                log::warn!(
                    "allocation of {} bytes ({:?}) exceeds budget: {} of {} in use",
                    size,
                    properties.allocation_type,
                    self.stats.bytes_in_use,
                    budget
                );
                return Err(Error::OutOfDeviceMemory);
            }
        }

        let gpu_va = align_up(self.next_gpu_va as usize, alignment) as u64;
        self.next_gpu_va = gpu_va + size as u64;

        let id = AllocationId::new(self.next_id);
        self.next_id += 1;

        self.stats.allocations += 1;
        self.stats.bytes_in_use += size;
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.stats.bytes_in_use);

        log::trace!(
            "allocated {:?} {} bytes at {}",
            properties.allocation_type,
            size,
            GpuAddr::new(gpu_va)
        );

        Ok(GraphicsAllocation::new(id, properties, GpuAddr::new(gpu_va), size))
    }

    fn free_graphics_memory(&mut self, allocation: GraphicsAllocation) {
        self.stats.frees += 1;
        self.stats.bytes_in_use = self.stats.bytes_in_use.saturating_sub(allocation.size());
        log::trace!("freed {:?}", allocation);
    }

    fn internal_heap_base_address(&self) -> GpuAddr {
        self.internal_heap_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationType;

    #[test]
    fn test_allocations_do_not_overlap() {
        let mut mm = SystemMemoryManager::new();
        let props = AllocationProperties::new(100, 64, AllocationType::Buffer);
        let a = mm.allocate_graphics_memory(&props).unwrap();
        let b = mm.allocate_graphics_memory(&props).unwrap();

        assert_ne!(a.id(), b.id());
        assert!(b.gpu_address().raw() >= a.gpu_address().raw() + a.size() as u64);
        assert_eq!(a.size(), memory_constants::PAGE_SIZE);
    }

    #[test]
    fn test_alignment_is_honored() {
        let mut mm = SystemMemoryManager::new();
        let small = AllocationProperties::new(16, 0, AllocationType::Buffer);
        mm.allocate_graphics_memory(&small).unwrap();

        let big = AllocationProperties::new(16, memory_constants::PAGE_SIZE_64K, AllocationType::Buffer);
        let alloc = mm.allocate_graphics_memory(&big).unwrap();
        assert!(alloc.gpu_address().is_aligned(memory_constants::PAGE_SIZE_64K as u64));
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut mm = SystemMemoryManager::with_budget(2 * memory_constants::PAGE_SIZE);
        let props = AllocationProperties::new(memory_constants::PAGE_SIZE, 0, AllocationType::Buffer);

        let a = mm.allocate_graphics_memory(&props).unwrap();
        let _b = mm.allocate_graphics_memory(&props).unwrap();
        assert_eq!(
            mm.allocate_graphics_memory(&props).unwrap_err(),
            Error::OutOfDeviceMemory
        );
        assert_eq!(mm.stats().failures, 1);

        mm.free_graphics_memory(a);
        assert!(mm.allocate_graphics_memory(&props).is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        let mut mm = SystemMemoryManager::new();
        let props = AllocationProperties::new(0, 0, AllocationType::Buffer);
        assert_eq!(
            mm.allocate_graphics_memory(&props).unwrap_err(),
            Error::InvalidParameter
        );
    }
}
