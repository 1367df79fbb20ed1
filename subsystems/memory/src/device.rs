//! # Device
//!
//! The handle command building receives from the driver layer: the device
//! environment, its memory manager and the completion counters the
//! submission layer keeps up to date.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::{Mutex, MutexGuard};

use forge_core::RootDeviceEnvironment;

use crate::manager::{MemoryManager, SystemMemoryManager};

/// One root device
#[derive(Debug)]
pub struct Device {
    root_device_index: u32,
    environment: Arc<RootDeviceEnvironment>,
    memory_manager: Mutex<Box<dyn MemoryManager + Send>>,
    /// Task count of the most recent submission
    task_count: AtomicU64,
    /// Highest task count the GPU reported complete
    completed_task_count: AtomicU64,
}

impl Device {
    /// Create a device over a memory manager
    pub fn new(
        root_device_index: u32,
        environment: Arc<RootDeviceEnvironment>,
        memory_manager: Box<dyn MemoryManager + Send>,
    ) -> Self {
        Self {
            root_device_index,
            environment,
            memory_manager: Mutex::new(memory_manager),
            task_count: AtomicU64::new(0),
            completed_task_count: AtomicU64::new(0),
        }
    }

    /// Create a device backed by host memory
    pub fn with_system_memory(environment: Arc<RootDeviceEnvironment>) -> Self {
        Self::new(0, environment, Box::new(SystemMemoryManager::new()))
    }

    /// Root device index
    #[inline]
    pub fn root_device_index(&self) -> u32 {
        self.root_device_index
    }

    /// Device environment
    #[inline]
    pub fn environment(&self) -> &Arc<RootDeviceEnvironment> {
        &self.environment
    }

    /// Lock the memory manager
    pub fn memory_manager(&self) -> MutexGuard<'_, Box<dyn MemoryManager + Send>> {
        self.memory_manager.lock()
    }

    /// Task count of the most recent submission
    pub fn task_count(&self) -> u64 {
        self.task_count.load(Ordering::Acquire)
    }

    /// Start a new submission and return its task count
    pub fn advance_task_count(&self) -> u64 {
        self.task_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Highest task count known complete
    pub fn completed_task_count(&self) -> u64 {
        self.completed_task_count.load(Ordering::Acquire)
    }

    /// Record GPU progress. Never moves backwards.
    pub fn update_completed_task_count(&self, task_count: u64) {
        self.completed_task_count.fetch_max(task_count, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::hw_info::{HardwareInfo, ProductFamily, Stepping};

    #[test]
    fn test_completion_is_monotonic() {
        let env = Arc::new(RootDeviceEnvironment::new(HardwareInfo::new(
            ProductFamily::Tigerlake,
            Stepping::A0,
        )));
        let device = Device::with_system_memory(env);

        assert_eq!(device.advance_task_count(), 1);
        assert_eq!(device.advance_task_count(), 2);
        device.update_completed_task_count(2);
        device.update_completed_task_count(1);
        assert_eq!(device.completed_task_count(), 2);
    }
}
