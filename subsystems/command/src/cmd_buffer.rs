//! # Command Buffer Allocator
//!
//! Supplies and rotates the memory commands are written into.
//!
//! ```text
//!            allocate_next / close_and_allocate_next
//!   recycle list ──reuse──▶ LinearStream (current) ──close──▶ closed buffers
//!        ▲                                                         │
//!        └────────────────────── reset / destroy ──────────────────┘
//! ```
//!
//! A buffer goes back to a recycle list stamped with the device task count;
//! it is handed out again only once the device reports that count complete.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use forge_core::types::align_up;
use forge_core::Result;
use forge_memory::{
    AllocationId, AllocationProperties, AllocationType, AllocationsList, Device,
    GraphicsAllocation,
};

use crate::config::CommandContainerConfig;
use crate::linear_stream::LinearStream;

/// Recycle list shared by the containers of one device
pub type SharedAllocationsList = Arc<Mutex<AllocationsList>>;

/// Owner of a container's command buffers
#[derive(Debug)]
pub struct CommandBufferAllocator {
    device: Arc<Device>,
    default_size: usize,
    total_size: usize,
    /// Buffer being written
    stream: LinearStream,
    /// Closed buffers, in execution order
    closed: Vec<GraphicsAllocation>,
    reusable_list: Option<SharedAllocationsList>,
    /// Private list of an immediate command list
    immediate_reusable_list: Option<AllocationsList>,
}

impl CommandBufferAllocator {
    /// Allocator without buffers
    pub fn new(
        device: Arc<Device>,
        config: &CommandContainerConfig,
        reusable_list: Option<SharedAllocationsList>,
    ) -> Self {
        Self {
            device,
            default_size: config.default_cmd_buffer_size,
            total_size: align_up(config.total_cmd_buffer_size(), config.cmd_buffer_alignment),
            stream: LinearStream::new(),
            closed: Vec::new(),
            reusable_list,
            immediate_reusable_list: None,
        }
    }

    /// Allocation size of one buffer, trailer and alignment included
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Stream over the current buffer
    #[inline]
    pub fn stream(&self) -> &LinearStream {
        &self.stream
    }

    /// Mutable stream over the current buffer
    #[inline]
    pub fn stream_mut(&mut self) -> &mut LinearStream {
        &mut self.stream
    }

    /// Device shared recycle list
    pub fn reusable_list(&self) -> Option<&SharedAllocationsList> {
        self.reusable_list.as_ref()
    }

    /// Number of buffers, current included
    pub fn buffer_count(&self) -> usize {
        self.closed.len() + usize::from(self.stream.graphics_allocation().is_some())
    }

    /// Buffers in execution order, current last
    pub fn cmd_buffer_allocations(&self) -> impl Iterator<Item = &GraphicsAllocation> {
        self.closed.iter().chain(self.stream.graphics_allocation())
    }

    /// Every buffer this allocator owns, recycle list of an immediate
    /// command list included
    pub fn allocation_ids(&self) -> Vec<AllocationId> {
        let private = self
            .immediate_reusable_list
            .iter()
            .flat_map(AllocationsList::iter);
        self.cmd_buffer_allocations()
            .chain(private)
            .map(GraphicsAllocation::id)
            .collect()
    }

    /// Allocate a fresh buffer from the memory manager
    pub fn allocate_command_buffer(&self) -> Result<GraphicsAllocation> {
        let props = AllocationProperties::new(self.total_size, 0, AllocationType::CommandBuffer);
        let result = self.device.memory_manager().allocate_graphics_memory(&props);
        if result.is_err() {
            log::warn!("command buffer allocation of {} bytes failed", self.total_size);
        }
        result
    }

    /// Take a completed buffer from the recycle lists
    pub fn reuse_existing(&mut self) -> Option<GraphicsAllocation> {
        let completed = self.device.completed_task_count();
        if let Some(list) = self.immediate_reusable_list.as_mut() {
            if let Some(alloc) =
                list.detach_allocation(self.total_size, completed, AllocationType::CommandBuffer)
            {
                return Some(alloc);
            }
        }
        self.reusable_list.as_ref().and_then(|list| {
            list.lock()
                .detach_allocation(self.total_size, completed, AllocationType::CommandBuffer)
        })
    }

    /// Recycled buffer if one is ready, fresh allocation otherwise
    pub fn obtain_next_command_buffer_allocation(&mut self) -> Result<GraphicsAllocation> {
        match self.reuse_existing() {
            Some(alloc) => {
                log::trace!("reusing command buffer {:?}", alloc.id());
                Ok(alloc)
            }
            None => self.allocate_command_buffer(),
        }
    }

    /// Make a new buffer current. The previous one joins the closed
    /// buffers as is. On failure nothing changes.
    pub fn allocate_next(&mut self) -> Result<AllocationId> {
        let next = self.obtain_next_command_buffer_allocation()?;
        Ok(self.install(next))
    }

    /// Chain the current buffer to a new one and make that current
    pub fn close_and_allocate_next(&mut self) -> Result<AllocationId> {
        let next = self.obtain_next_command_buffer_allocation()?;
        if let Err(err) = self.stream.write_batch_buffer_start(next.gpu_address()) {
            self.store_allocation_and_flush_tag_update(next);
            return Err(err);
        }
        Ok(self.install(next))
    }

    /// Make `allocation` the current buffer without chaining. The previous
    /// one joins the closed buffers.
    pub fn set_cmd_buffer(&mut self, allocation: GraphicsAllocation) -> AllocationId {
        self.install(allocation)
    }

    fn install(&mut self, next: GraphicsAllocation) -> AllocationId {
        let id = next.id();
        log::trace!(
            "command buffer {:?} at {} after {} bytes",
            id,
            next.gpu_address(),
            self.stream.used()
        );
        if let Some(previous) = self.stream.replace_buffer(next, self.default_size) {
            self.closed.push(previous);
        }
        id
    }

    /// Keep the first buffer, release the rest and rewind. Returns the
    /// buffer that stays current.
    pub fn reset(&mut self) -> Option<AllocationId> {
        let mut buffers = core::mem::take(&mut self.closed);
        buffers.extend(self.stream.take_allocation());

        let mut buffers = buffers.into_iter();
        let first = buffers.next()?;
        let id = first.id();
        for alloc in buffers {
            self.store_allocation_and_flush_tag_update(alloc);
        }
        self.stream.replace_buffer(first, self.default_size);
        Some(id)
    }

    /// Release buffers from position `start_index` of the execution order
    pub fn handle_cmd_buffer_allocations(&mut self, start_index: usize) {
        let mut buffers = core::mem::take(&mut self.closed);
        buffers.extend(self.stream.take_allocation());
        let released = buffers.split_off(start_index.min(buffers.len()));

        for alloc in released {
            self.store_allocation_and_flush_tag_update(alloc);
        }
        if let Some(last) = buffers.pop() {
            self.closed = buffers;
            self.stream.replace_buffer(last, self.default_size);
        }
    }

    /// Move the current buffer to the recycle list and continue in another
    pub fn add_current_command_buffer_to_reusable_allocation_list(
        &mut self,
    ) -> Result<AllocationId> {
        let next = self.obtain_next_command_buffer_allocation()?;
        let id = next.id();
        if let Some(current) = self.stream.replace_buffer(next, self.default_size) {
            self.store_allocation_and_flush_tag_update(current);
        }
        Ok(id)
    }

    /// Pre-populate the private recycle list with `amount` buffers
    pub fn fill_reusable_allocation_lists(&mut self, amount: usize) -> Result<Vec<AllocationId>> {
        if self.immediate_reusable_list.is_some() {
            return Ok(Vec::new());
        }
        let mut list = AllocationsList::new();
        let mut ids = Vec::with_capacity(amount);
        for _ in 0..amount {
            let alloc = match self.allocate_command_buffer() {
                Ok(alloc) => alloc,
                Err(err) => {
                    list.free_all_graphics_allocations(&mut **self.device.memory_manager());
                    return Err(err);
                }
            };
            ids.push(alloc.id());
            list.push_tail_one(alloc);
        }
        self.immediate_reusable_list = Some(list);
        Ok(ids)
    }

    /// Stamp `alloc` with the device task count and put it on a recycle
    /// list. Freed outright when there is none.
    pub fn store_allocation_and_flush_tag_update(&mut self, mut alloc: GraphicsAllocation) {
        alloc.update_task_count(self.device.task_count());
        if let Some(list) = self.immediate_reusable_list.as_mut() {
            list.push_tail_one(alloc);
        } else if let Some(list) = self.reusable_list.as_ref() {
            list.lock().push_tail_one(alloc);
        } else {
            self.device.memory_manager().free_graphics_memory(alloc);
        }
    }

    /// Release every buffer. The private recycle list is freed.
    pub fn destroy(&mut self) {
        self.handle_cmd_buffer_allocations(0);
        if let Some(mut list) = self.immediate_reusable_list.take() {
            list.free_all_graphics_allocations(&mut **self.device.memory_manager());
        }
    }
}

impl Drop for CommandBufferAllocator {
    fn drop(&mut self) {
        self.destroy();
    }
}
