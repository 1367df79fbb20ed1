//! # Allocations List
//!
//! Recycle list of allocations whose prior GPU work may have finished.
//! Shared by every container of a device; callers serialize access (the
//! containers hold it behind a `spin::Mutex`).

use alloc::vec::Vec;

use crate::allocation::{AllocationType, GraphicsAllocation};
use crate::manager::MemoryManager;

/// Recycle list
#[derive(Debug, Default)]
pub struct AllocationsList {
    entries: Vec<GraphicsAllocation>,
    /// Allocations handed back out
    reused: u64,
}

impl AllocationsList {
    /// Empty list
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            reused: 0,
        }
    }

    /// Append an allocation
    pub fn push_tail_one(&mut self, allocation: GraphicsAllocation) {
        self.entries.push(allocation);
    }

    /// Take the first allocation of `allocation_type` that is at least
    /// `required_min_size` bytes and whose work completed by
    /// `completed_task_count`.
    pub fn detach_allocation(
        &mut self,
        required_min_size: usize,
        completed_task_count: u64,
        allocation_type: AllocationType,
    ) -> Option<GraphicsAllocation> {
        let index = self.entries.iter().position(|alloc| {
            alloc.allocation_type() == allocation_type
                && alloc.size() >= required_min_size
                && alloc.is_completed(completed_task_count)
        })?;
        self.reused += 1;
        Some(self.entries.swap_remove(index))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of successful detaches
    pub fn reuse_count(&self) -> u64 {
        self.reused
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = &GraphicsAllocation> {
        self.entries.iter()
    }

    /// Release every entry to the memory manager
    pub fn free_all_graphics_allocations(&mut self, memory_manager: &mut dyn MemoryManager) {
        for allocation in self.entries.drain(..) {
            memory_manager.free_graphics_memory(allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationProperties;
    use crate::manager::SystemMemoryManager;

    fn cmd_buffer(mm: &mut SystemMemoryManager, size: usize) -> GraphicsAllocation {
        let props = AllocationProperties::new(size, 0, AllocationType::CommandBuffer);
        mm.allocate_graphics_memory(&props).unwrap()
    }

    #[test]
    fn test_detach_requires_completion() {
        let mut mm = SystemMemoryManager::new();
        let mut list = AllocationsList::new();
        let mut alloc = cmd_buffer(&mut mm, 4096);
        alloc.update_task_count(10);
        list.push_tail_one(alloc);

        assert!(list.detach_allocation(4096, 9, AllocationType::CommandBuffer).is_none());
        assert!(list.detach_allocation(4096, 10, AllocationType::CommandBuffer).is_some());
        assert!(list.is_empty());
        assert_eq!(list.reuse_count(), 1);
    }

    #[test]
    fn test_detach_filters_type_and_size() {
        let mut mm = SystemMemoryManager::new();
        let mut list = AllocationsList::new();
        list.push_tail_one(cmd_buffer(&mut mm, 4096));

        assert!(list.detach_allocation(8192, 0, AllocationType::CommandBuffer).is_none());
        assert!(list.detach_allocation(4096, 0, AllocationType::LinearStream).is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_free_all() {
        let mut mm = SystemMemoryManager::new();
        let mut list = AllocationsList::new();
        list.push_tail_one(cmd_buffer(&mut mm, 4096));
        list.push_tail_one(cmd_buffer(&mut mm, 4096));

        list.free_all_graphics_allocations(&mut mm);
        assert!(list.is_empty());
        assert_eq!(mm.stats().frees, 2);
        assert_eq!(mm.stats().bytes_in_use, 0);
    }
}
