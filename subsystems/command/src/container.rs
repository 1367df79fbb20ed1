//! # Command Stream Container
//!
//! Everything one command list writes into: the command buffers, one heap
//! region per category, the allocations that must be resident when the
//! buffers execute and the ones to free once they have.
//!
//! ## Heap Growth
//!
//! ```text
//!   before                         after get_heap_space_allow_grow(SSH, n)
//!   ┌────────────────────┬──┐      ┌──────────────────────────────────────┐
//!   │ used               │  │ ──▶  │ n │ free                             │
//!   └────────────────────┴──┘      └──────────────────────────────────────┘
//!   old region: deallocation list, still resident for this submission
//! ```
//!
//! Nothing is copied into the new region. Offsets handed out before a grow
//! refer to the old region and must not be written through afterwards.
//!
//! ## Heap Sharing
//!
//! An immediate command list may borrow the dynamic-state and surface-state
//! heaps of the command stream receiver it submits to. Only those two
//! categories are ever shared. The receiver decides whether its heaps may
//! be replaced when a dispatch reservation does not fit.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;
use core::ops::{Deref, DerefMut};

use bitflags::bitflags;
use spin::{Mutex, MutexGuard};

use forge_core::error::unrecoverable_if;
use forge_core::types::{align_up, is_aligned};
use forge_core::{Error, GpuAddr, Result};
use forge_memory::{
    AllocationId, AllocationProperties, Device, GraphicsAllocation, HeapReservation, HeapSpace,
    HeapType, IndirectHeap,
};

use crate::cmd_buffer::{CommandBufferAllocator, SharedAllocationsList};
use crate::config::CommandContainerConfig;
use crate::linear_stream::LinearStream;
use crate::residency::ResidencyContainer;

// =============================================================================
// DIRTY MASK
// =============================================================================

bitflags! {
    /// Heap categories whose base address must be re-emitted
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyHeaps: u32 {
        /// Dynamic state heap
        const DYNAMIC_STATE = 1 << 0;
        /// Indirect object heap
        const INDIRECT_OBJECT = 1 << 1;
        /// Surface state heap
        const SURFACE_STATE = 1 << 2;
        /// Instruction heap
        const INSTRUCTION = 1 << 3;
    }
}

impl DirtyHeaps {
    /// Bit of one category
    pub const fn of(heap_type: HeapType) -> Self {
        Self::from_bits_retain(1 << heap_type.index())
    }
}

// =============================================================================
// RESULT CODES
// =============================================================================

/// Outcome of [`CommandContainer::initialize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    /// Ready for use
    Success = 0,
    /// A command buffer or heap could not be allocated
    OutOfDeviceMemory = 1,
}

// =============================================================================
// SHARED HEAPS
// =============================================================================

/// Heap owned by a command stream receiver
pub type SharedHeap = Arc<Mutex<IndirectHeap>>;

/// Heaps an immediate command list borrows from its receiver
#[derive(Debug, Clone)]
pub struct CsrSharedHeaps {
    /// Receiver's dynamic state heap
    pub dynamic_state: SharedHeap,
    /// Receiver's surface state heap
    pub surface_state: SharedHeap,
}

impl CsrSharedHeaps {
    /// Wrap two receiver heaps
    pub fn new(dynamic_state: IndirectHeap, surface_state: IndirectHeap) -> Self {
        Self {
            dynamic_state: Arc::new(Mutex::new(dynamic_state)),
            surface_state: Arc::new(Mutex::new(surface_state)),
        }
    }

    /// Shared heap of `heap_type`, if that category is shareable
    pub fn get(&self, heap_type: HeapType) -> Option<&SharedHeap> {
        match heap_type {
            HeapType::DynamicState => Some(&self.dynamic_state),
            HeapType::SurfaceState => Some(&self.surface_state),
            HeapType::IndirectObject | HeapType::Instruction => None,
        }
    }
}

/// Access to a heap, owned or locked
#[derive(Debug)]
pub enum HeapGuard<'a> {
    /// Heap owned by the container
    Owned(&'a mut IndirectHeap),
    /// Receiver heap, locked for the guard's lifetime
    Shared(MutexGuard<'a, IndirectHeap>),
}

impl Deref for HeapGuard<'_> {
    type Target = IndirectHeap;

    fn deref(&self) -> &IndirectHeap {
        match self {
            HeapGuard::Owned(heap) => heap,
            HeapGuard::Shared(heap) => heap,
        }
    }
}

impl DerefMut for HeapGuard<'_> {
    fn deref_mut(&mut self) -> &mut IndirectHeap {
        match self {
            HeapGuard::Owned(heap) => heap,
            HeapGuard::Shared(heap) => heap,
        }
    }
}

/// Request and result of one dispatch reservation
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapReserveArguments {
    /// Window size
    pub size: usize,
    /// Window alignment, 0 for none
    pub alignment: usize,
    /// Filled by `reserve_space_for_dispatch`
    pub reservation: Option<HeapReservation>,
}

impl HeapReserveArguments {
    /// Request a window
    pub const fn new(size: usize, alignment: usize) -> Self {
        Self {
            size,
            alignment,
            reservation: None,
        }
    }
}

// =============================================================================
// COMMAND CONTAINER
// =============================================================================

/// Command buffers, heaps and residency of one command list
#[derive(Debug)]
pub struct CommandContainer {
    device: Arc<Device>,
    config: CommandContainerConfig,
    allocator: CommandBufferAllocator,
    heaps: [Option<IndirectHeap>; HeapType::COUNT],
    shared_heaps: Option<CsrSharedHeaps>,
    heap_sharing_enabled: bool,
    residency: ResidencyContainer,
    /// Freed once the submission that used them completes
    deallocation: Vec<GraphicsAllocation>,
    dirty_heaps: DirtyHeaps,
    instruction_heap_base_address: GpuAddr,
    indirect_object_heap_base_address: GpuAddr,
    reserved_ssh_size: usize,
    idd_block: Option<HeapSpace>,
    num_idd_per_block: u32,
    flush_task_used_for_immediate: bool,
    /// Next free interface descriptor in the current block
    pub next_idd_in_block: u32,
    /// Shared local memory size last programmed, `u32::MAX` when unknown
    pub slm_size: u32,
    /// Pipeline select mode of the last dispatch
    pub last_pipeline_select_mode_required: bool,
    /// Global atomics setting of the last STATE_BASE_ADDRESS
    pub last_sent_use_global_atomics: bool,
    /// Whether PIPELINE_SELECT carries a systolic mode on this device
    pub systolic_mode_support: bool,
}

impl CommandContainer {
    /// Container without buffers or heaps
    pub fn new(device: Arc<Device>, config: CommandContainerConfig) -> Self {
        let allocator = CommandBufferAllocator::new(device.clone(), &config, None);
        Self {
            residency: ResidencyContainer::with_capacity(config.starting_residency_container_size),
            num_idd_per_block: config.num_idd_per_block,
            device,
            config,
            allocator,
            heaps: [None, None, None, None],
            shared_heaps: None,
            heap_sharing_enabled: false,
            deallocation: Vec::new(),
            dirty_heaps: DirtyHeaps::from_bits_retain(u32::MAX),
            instruction_heap_base_address: GpuAddr::null(),
            indirect_object_heap_base_address: GpuAddr::null(),
            reserved_ssh_size: 0,
            idd_block: None,
            flush_task_used_for_immediate: false,
            next_idd_in_block: 0,
            slm_size: u32::MAX,
            last_pipeline_select_mode_required: false,
            last_sent_use_global_atomics: false,
            systolic_mode_support: false,
        }
    }

    /// Allocate the first command buffer and, if `require_heaps`, one
    /// region per heap category not borrowed from the receiver.
    pub fn initialize(
        &mut self,
        reusable_list: Option<SharedAllocationsList>,
        require_heaps: bool,
    ) -> ErrorCode {
        for id in self.allocator.allocation_ids() {
            self.residency.remove(id);
        }
        self.allocator = CommandBufferAllocator::new(self.device.clone(), &self.config, reusable_list);
        match self.allocator.allocate_next() {
            Ok(id) => self.track_cmd_buffer(id),
            Err(_) => return ErrorCode::OutOfDeviceMemory,
        }
        self.systolic_mode_support = self
            .device
            .environment()
            .pipeline_select_properties_support()
            .systolic_mode;

        if require_heaps {
            for heap_type in HeapType::ALL {
                if self.immediate_cmd_list_shared_heap(heap_type) {
                    continue;
                }
                if self
                    .create_and_assign_new_heap(heap_type, self.config.default_heap_size)
                    .is_err()
                {
                    return ErrorCode::OutOfDeviceMemory;
                }
            }
            let base = self.device.memory_manager().internal_heap_base_address();
            self.instruction_heap_base_address = base;
            self.indirect_object_heap_base_address = base;
        }

        if self.prepare_bindful_ssh().is_err() {
            return ErrorCode::OutOfDeviceMemory;
        }
        self.idd_block = None;
        self.next_idd_in_block = self.num_idd_per_block;

        log::debug!(
            "command container initialized: buffer {} bytes, heaps {}, sharing {}",
            self.allocator.total_size(),
            require_heaps,
            self.heap_sharing_enabled
        );
        ErrorCode::Success
    }

    /// Device
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Sizing in effect
    #[inline]
    pub fn config(&self) -> &CommandContainerConfig {
        &self.config
    }

    // =========================================================================
    // Command buffers
    // =========================================================================

    /// Stream over the current command buffer
    #[inline]
    pub fn command_stream(&self) -> &LinearStream {
        self.allocator.stream()
    }

    /// Mutable stream over the current command buffer
    #[inline]
    pub fn command_stream_mut(&mut self) -> &mut LinearStream {
        self.allocator.stream_mut()
    }

    /// Command buffers in execution order
    pub fn cmd_buffer_allocations(&self) -> impl Iterator<Item = &GraphicsAllocation> {
        self.allocator.cmd_buffer_allocations()
    }

    /// Whether command buffers are made resident by the flush task of an
    /// immediate command list instead of this container
    #[inline]
    pub fn flush_task_used_for_immediate(&self) -> bool {
        self.flush_task_used_for_immediate
    }

    /// Switch command buffer residency to the flush task
    pub fn set_flush_task_used_for_immediate(&mut self, used: bool) {
        self.flush_task_used_for_immediate = used;
    }

    fn track_cmd_buffer(&mut self, id: AllocationId) {
        if !self.flush_task_used_for_immediate {
            self.residency.insert(id);
        }
    }

    /// Start writing into a new command buffer
    pub fn allocate_next_command_buffer(&mut self) -> Result<()> {
        let id = self.allocator.allocate_next()?;
        self.track_cmd_buffer(id);
        Ok(())
    }

    /// Chain the current command buffer to a new one
    pub fn close_and_allocate_next_command_buffer(&mut self) -> Result<()> {
        let id = self.allocator.close_and_allocate_next()?;
        self.track_cmd_buffer(id);
        Ok(())
    }

    /// Continue in `allocation` without chaining the current buffer to it
    pub fn set_cmd_buffer(&mut self, allocation: GraphicsAllocation) {
        let id = self.allocator.set_cmd_buffer(allocation);
        self.track_cmd_buffer(id);
    }

    /// Terminate the current command buffer
    pub fn end_command_buffer(&mut self) -> Result<()> {
        self.allocator.stream_mut().write_batch_buffer_end()
    }

    /// Recycled command buffer if one is ready, fresh allocation otherwise
    pub fn obtain_next_command_buffer_allocation(&mut self) -> Result<GraphicsAllocation> {
        self.allocator.obtain_next_command_buffer_allocation()
    }

    /// Release command buffers from position `start_index` on
    pub fn handle_cmd_buffer_allocations(&mut self, start_index: usize) {
        self.allocator.handle_cmd_buffer_allocations(start_index);
    }

    /// Hand the current command buffer back for reuse and continue in another
    pub fn add_current_command_buffer_to_reusable_allocation_list(&mut self) -> Result<()> {
        let id = self.allocator.add_current_command_buffer_to_reusable_allocation_list()?;
        self.track_cmd_buffer(id);
        Ok(())
    }

    /// Pre-populate the recycle list of an immediate command list
    pub fn fill_reusable_allocation_lists(&mut self) -> Result<()> {
        let ids = self
            .allocator
            .fill_reusable_allocation_lists(self.config.allocations_to_fill)?;
        for id in ids {
            self.track_cmd_buffer(id);
        }
        Ok(())
    }

    /// Stamp an allocation with the current task count and recycle it
    pub fn store_allocation_and_flush_tag_update(&mut self, allocation: GraphicsAllocation) {
        self.allocator.store_allocation_and_flush_tag_update(allocation);
    }

    // =========================================================================
    // Residency and deallocation
    // =========================================================================

    /// Allocations that must be resident for execution
    #[inline]
    pub fn residency_container(&self) -> &ResidencyContainer {
        &self.residency
    }

    /// Require `id` to be resident
    pub fn add_to_residency_container(&mut self, id: AllocationId) {
        self.residency.insert(id);
    }

    /// Allocations waiting for the submission to complete
    #[inline]
    pub fn deallocation_container(&self) -> &[GraphicsAllocation] {
        &self.deallocation
    }

    /// Transfer the deallocation list to the submission layer
    pub fn take_deallocation_container(&mut self) -> Vec<GraphicsAllocation> {
        mem::take(&mut self.deallocation)
    }

    fn free_deallocation_container(&mut self) {
        if self.deallocation.is_empty() {
            return;
        }
        let mut memory_manager = self.device.memory_manager();
        for allocation in self.deallocation.drain(..) {
            memory_manager.free_graphics_memory(allocation);
        }
    }

    // =========================================================================
    // Heaps
    // =========================================================================

    /// Borrow DSH and SSH from the receiver from now on
    pub fn enable_heap_sharing(&mut self) {
        self.heap_sharing_enabled = true;
    }

    /// Receiver heaps used when sharing is enabled
    pub fn set_immediate_cmd_list_csr_heaps(&mut self, heaps: CsrSharedHeaps) {
        self.shared_heaps = Some(heaps);
    }

    /// Whether `heap_type` comes from the receiver
    #[inline]
    pub fn immediate_cmd_list_shared_heap(&self, heap_type: HeapType) -> bool {
        self.heap_sharing_enabled
            && matches!(heap_type, HeapType::DynamicState | HeapType::SurfaceState)
    }

    /// Current heap of a category
    pub fn get_indirect_heap(&mut self, heap_type: HeapType) -> Option<HeapGuard<'_>> {
        if self.immediate_cmd_list_shared_heap(heap_type) {
            let shared = self.shared_heaps.as_ref()?.get(heap_type)?;
            return Some(HeapGuard::Shared(shared.lock()));
        }
        self.heaps[heap_type.index()].as_mut().map(HeapGuard::Owned)
    }

    /// Allocation backing the container's own heap of a category
    pub fn indirect_heap_allocation(&self, heap_type: HeapType) -> Option<AllocationId> {
        self.heaps[heap_type.index()]
            .as_ref()
            .map(|heap| heap.allocation().id())
    }

    /// Base the instruction heap is addressed from
    #[inline]
    pub fn instruction_heap_base_address(&self) -> GpuAddr {
        self.instruction_heap_base_address
    }

    /// Base the indirect object heap is addressed from
    #[inline]
    pub fn indirect_object_heap_base_address(&self) -> GpuAddr {
        self.indirect_object_heap_base_address
    }

    /// Hand out `size` bytes of a heap, replacing its region if needed
    pub fn get_heap_space_allow_grow(&mut self, heap_type: HeapType, size: usize) -> Result<HeapSpace> {
        self.get_heap_with_required_size(heap_type, size, 0, true)?
            .get_space(size)
    }

    /// Heap with `size_required` bytes free after aligning the cursor
    pub fn get_heap_with_required_size_and_alignment(
        &mut self,
        heap_type: HeapType,
        size_required: usize,
        alignment: usize,
    ) -> Result<HeapGuard<'_>> {
        self.get_heap_with_required_size(heap_type, size_required, alignment, false)
    }

    fn get_heap_with_required_size(
        &mut self,
        heap_type: HeapType,
        size_required: usize,
        alignment: usize,
        allow_grow: bool,
    ) -> Result<HeapGuard<'_>> {
        if self.immediate_cmd_list_shared_heap(heap_type) {
            let shared = self
                .shared_heaps
                .as_ref()
                .and_then(|heaps| heaps.get(heap_type))
                .ok_or(Error::NotInitialized)?;
            let mut heap = shared.lock();
            let requested = size_requested(&heap, size_required, alignment);
            unrecoverable_if(
                heap.available_space() < requested,
                "shared heap has no room for the request",
            );
            self.residency.insert(heap.allocation().id());
            if alignment > 0 {
                heap.align(alignment);
            }
            return Ok(HeapGuard::Shared(heap));
        }

        let index = heap_type.index();
        // a fresh region also loses the reserved bindful prefix and the
        // padding behind it
        let reserved = if heap_type == HeapType::SurfaceState {
            self.reserved_ssh_size
        } else {
            0
        };
        let fresh_minimum = size_required + alignment + reserved;
        let new_size = match self.heaps[index].as_ref() {
            None => Some(self.config.default_heap_size.max(fresh_minimum)),
            Some(heap) => {
                let requested = size_requested(heap, size_required, alignment);
                (heap.available_space() < requested).then(|| {
                    grown_size(heap, fresh_minimum, allow_grow, self.config.heap_growth_granularity)
                })
            }
        };

        if let Some(new_size) = new_size {
            self.create_and_assign_new_heap(heap_type, new_size)?;
            if heap_type == HeapType::SurfaceState && self.reserved_ssh_size > 0 {
                let reserved = self.reserved_ssh_size;
                if let Some(heap) = self.heaps[index].as_mut() {
                    heap.get_space(reserved)?;
                }
            }
        }

        let heap = self.heaps[index].as_mut().ok_or(Error::NotInitialized)?;
        if alignment > 0 {
            heap.align(alignment);
        }
        Ok(HeapGuard::Owned(heap))
    }

    fn create_and_assign_new_heap(&mut self, heap_type: HeapType, size: usize) -> Result<()> {
        let allocation = allocate_heap(&self.device, &self.config, heap_type, size)?;
        log::trace!(
            "{} region {:?} of {} bytes at {}",
            heap_type,
            allocation.id(),
            allocation.size(),
            allocation.gpu_address()
        );
        self.residency.insert(allocation.id());

        let slot = &mut self.heaps[heap_type.index()];
        match slot {
            Some(heap) => {
                let old = heap.replace_allocation(allocation);
                self.deallocation.push(old);
            }
            None => *slot = Some(IndirectHeap::new(heap_type, allocation, true)),
        }
        self.set_heap_dirty(heap_type);
        Ok(())
    }

    /// Copy `data` into heap space handed out earlier
    pub fn write_heap(&mut self, space: &HeapSpace, data: &[u8]) -> Result<()> {
        self.get_indirect_heap(space.heap_type)
            .ok_or(Error::NotInitialized)?
            .write(space, data)
    }

    /// Carve fixed windows for one dispatch out of SSH and, if `get_dsh`,
    /// DSH. Writes into the windows never relocate.
    pub fn reserve_space_for_dispatch(
        &mut self,
        ssh_args: &mut HeapReserveArguments,
        dsh_args: &mut HeapReserveArguments,
        get_dsh: bool,
    ) -> Result<()> {
        self.reserve_heap(HeapType::SurfaceState, ssh_args)?;
        if get_dsh {
            self.reserve_heap(HeapType::DynamicState, dsh_args)?;
        }
        Ok(())
    }

    fn reserve_heap(&mut self, heap_type: HeapType, args: &mut HeapReserveArguments) -> Result<()> {
        if !self.immediate_cmd_list_shared_heap(heap_type) {
            let mut heap =
                self.get_heap_with_required_size(heap_type, args.size, args.alignment, true)?;
            args.reservation = Some(heap.reserve(args.size, 0)?);
            return Ok(());
        }

        let shared = self
            .shared_heaps
            .as_ref()
            .and_then(|heaps| heaps.get(heap_type))
            .cloned()
            .ok_or(Error::NotInitialized)?;
        let mut heap = shared.lock();
        let requested = args.size + args.alignment;
        if heap.available_space() < requested {
            if !heap.allows_grow() {
                log::warn!("fixed shared {} cannot fit {} bytes", heap_type, requested);
                return Err(Error::HeapExhausted);
            }
            let new_size =
                grown_size(&heap, requested, true, self.config.heap_growth_granularity);
            let allocation = allocate_heap(&self.device, &self.config, heap_type, new_size)?;
            log::trace!("shared {} replaced with {} bytes", heap_type, allocation.size());
            self.deallocation.push(heap.replace_allocation(allocation));
            self.set_heap_dirty(heap_type);
        }
        self.residency.insert(heap.allocation().id());
        args.reservation = Some(heap.reserve(args.size, args.alignment)?);
        Ok(())
    }

    /// Keep the first `size` bytes of SSH for bindful surface states
    pub fn set_reserved_ssh_size(&mut self, size: usize) {
        self.reserved_ssh_size = size;
    }

    /// Skip the reserved leading bytes of a fresh SSH
    pub fn prepare_bindful_ssh(&mut self) -> Result<()> {
        if self.reserved_ssh_size == 0 || self.immediate_cmd_list_shared_heap(HeapType::SurfaceState) {
            return Ok(());
        }
        let reserved = self.reserved_ssh_size;
        if let Some(ssh) = self.heaps[HeapType::SurfaceState.index()].as_mut() {
            if ssh.used() < reserved {
                let missing = reserved - ssh.used();
                ssh.get_space(missing)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Dirty mask
    // =========================================================================

    /// Whether a category must be re-emitted
    #[inline]
    pub fn is_heap_dirty(&self, heap_type: HeapType) -> bool {
        self.dirty_heaps.contains(DirtyHeaps::of(heap_type))
    }

    /// Whether any category must be re-emitted
    #[inline]
    pub fn is_any_heap_dirty(&self) -> bool {
        !self.dirty_heaps.is_empty()
    }

    /// Mark a category for re-emission
    #[inline]
    pub fn set_heap_dirty(&mut self, heap_type: HeapType) {
        self.dirty_heaps.insert(DirtyHeaps::of(heap_type));
    }

    /// Called after the base address of a category was re-emitted
    #[inline]
    pub fn clear_heap_dirty(&mut self, heap_type: HeapType) {
        self.dirty_heaps.remove(DirtyHeaps::of(heap_type));
    }

    /// Mark every category dirty or clean
    pub fn set_dirty_state_for_all_heaps(&mut self, dirty: bool) {
        self.dirty_heaps = if dirty {
            DirtyHeaps::from_bits_retain(u32::MAX)
        } else {
            DirtyHeaps::empty()
        };
    }

    /// Raw mask
    #[inline]
    pub fn dirty_heaps(&self) -> DirtyHeaps {
        self.dirty_heaps
    }

    // =========================================================================
    // Interface descriptors
    // =========================================================================

    /// DSH block interface descriptors are carved from
    pub fn set_idd_block(&mut self, block: Option<HeapSpace>) {
        self.idd_block = block;
    }

    /// Current interface descriptor block
    #[inline]
    pub fn idd_block(&self) -> Option<&HeapSpace> {
        self.idd_block.as_ref()
    }

    /// Interface descriptors per block
    #[inline]
    pub fn num_idd_per_block(&self) -> u32 {
        self.num_idd_per_block
    }

    /// Change the block size
    pub fn set_num_idd_per_block(&mut self, value: u32) {
        self.num_idd_per_block = value;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Prepare for re-recording after the previous submission completed
    pub fn reset(&mut self) -> Result<()> {
        self.set_dirty_state_for_all_heaps(true);
        self.residency.clear();
        self.free_deallocation_container();

        if let Some(id) = self.allocator.reset() {
            self.track_cmd_buffer(id);
        }
        for heap in self.heaps.iter_mut().flatten() {
            heap.rewind();
            self.residency.insert(heap.allocation().id());
        }
        self.prepare_bindful_ssh()?;

        self.idd_block = None;
        self.next_idd_in_block = self.num_idd_per_block;
        self.slm_size = u32::MAX;
        self.last_pipeline_select_mode_required = false;
        self.last_sent_use_global_atomics = false;
        log::debug!("command container reset, {} resident", self.residency.len());
        Ok(())
    }

    /// Release every owned allocation
    pub fn destroy(&mut self) {
        self.allocator.destroy();
        self.free_deallocation_container();
        let mut memory_manager = self.device.memory_manager();
        for heap in self.heaps.iter_mut().filter_map(Option::take) {
            memory_manager.free_graphics_memory(heap.into_allocation());
        }
        drop(memory_manager);
        self.shared_heaps = None;
        self.residency.clear();
    }
}

impl Drop for CommandContainer {
    fn drop(&mut self) {
        self.destroy();
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn size_requested(heap: &IndirectHeap, size_required: usize, alignment: usize) -> usize {
    if alignment > 0 && !is_aligned(heap.used(), alignment) {
        size_required + alignment
    } else {
        size_required
    }
}

/// Capacity of the region replacing `heap`
fn grown_size(heap: &IndirectHeap, requested: usize, allow_grow: bool, granularity: usize) -> usize {
    let mut new_size = heap.used() + heap.available_space();
    if allow_grow {
        new_size *= 2;
    }
    new_size = new_size.max(heap.available_space() + requested);
    align_up(new_size, granularity)
}

fn allocate_heap(
    device: &Device,
    config: &CommandContainerConfig,
    heap_type: HeapType,
    size: usize,
) -> Result<GraphicsAllocation> {
    let size = align_up(size, config.heap_growth_granularity);
    let props = AllocationProperties::new(size, config.heap_alignment, heap_type.allocation_type());
    device.memory_manager().allocate_graphics_memory(&props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use forge_core::hw_info::{HardwareInfo, ProductFamily, Stepping};
    use forge_core::types::memory_constants::{KILOBYTE, PAGE_SIZE_64K};
    use forge_core::RootDeviceEnvironment;
    use forge_memory::{AllocationsList, SystemMemoryManager};

    fn device(mm: SystemMemoryManager) -> Arc<Device> {
        let env = Arc::new(RootDeviceEnvironment::new(HardwareInfo::new(
            ProductFamily::Dg2,
            Stepping::B0,
        )));
        Arc::new(Device::new(0, env, Box::new(mm)))
    }

    fn config() -> CommandContainerConfig {
        CommandContainerConfig {
            default_cmd_buffer_size: 4 * KILOBYTE,
            ..CommandContainerConfig::default()
        }
    }

    fn container(require_heaps: bool) -> CommandContainer {
        let mut container = CommandContainer::new(device(SystemMemoryManager::new()), config());
        assert_eq!(container.initialize(None, require_heaps), ErrorCode::Success);
        container
    }

    fn receiver_heaps(dev: &Device, size: usize) -> CsrSharedHeaps {
        receiver_heaps_with_policy(dev, size, true)
    }

    fn receiver_heaps_with_policy(dev: &Device, size: usize, allow_grow: bool) -> CsrSharedHeaps {
        let mut mm = dev.memory_manager();
        let mut heap = |heap_type: HeapType| {
            let props = AllocationProperties::new(size, 0, heap_type.allocation_type());
            IndirectHeap::new(heap_type, mm.allocate_graphics_memory(&props).unwrap(), allow_grow)
        };
        let dsh = heap(HeapType::DynamicState);
        let ssh = heap(HeapType::SurfaceState);
        CsrSharedHeaps::new(dsh, ssh)
    }

    #[test]
    fn test_starts_with_all_heaps_dirty() {
        let container = container(true);
        assert_eq!(container.dirty_heaps().bits(), u32::MAX);
        for heap_type in HeapType::ALL {
            assert!(container.is_heap_dirty(heap_type));
        }
        // command buffer and four heaps
        assert_eq!(container.residency_container().len(), 5);
    }

    #[test]
    fn test_second_small_request_does_not_dirty() {
        let mut container = container(false);
        container.set_dirty_state_for_all_heaps(false);

        let first = container.get_heap_space_allow_grow(HeapType::SurfaceState, 64).unwrap();
        assert!(container.is_heap_dirty(HeapType::SurfaceState));
        container.clear_heap_dirty(HeapType::SurfaceState);

        let second = container.get_heap_space_allow_grow(HeapType::SurfaceState, 64).unwrap();
        assert!(!container.is_any_heap_dirty());
        assert_eq!(second.offset, first.offset + 64);
        assert_eq!(second.allocation_id, first.allocation_id);
    }

    #[test]
    fn test_grow_dirties_only_that_category() {
        let mut container = container(true);
        container.set_dirty_state_for_all_heaps(false);

        let old = container.get_heap_space_allow_grow(HeapType::DynamicState, PAGE_SIZE_64K - 64).unwrap();
        assert!(!container.is_any_heap_dirty());

        let fresh = container.get_heap_space_allow_grow(HeapType::DynamicState, 128).unwrap();
        assert_ne!(fresh.allocation_id, old.allocation_id);
        assert_eq!(fresh.offset, 0);
        assert_eq!(container.dirty_heaps(), DirtyHeaps::DYNAMIC_STATE);

        let heap = container.get_indirect_heap(HeapType::DynamicState).unwrap();
        assert_eq!(heap.max_available_space(), 2 * PAGE_SIZE_64K);
        drop(heap);

        // old region stays resident until the submission completes
        assert_eq!(container.deallocation_container().len(), 1);
        assert!(container.residency_container().contains(old.allocation_id));
        assert!(container.residency_container().contains(fresh.allocation_id));
    }

    #[test]
    fn test_required_size_and_alignment_replaces_without_doubling() {
        let mut container = container(true);
        container.get_heap_space_allow_grow(HeapType::IndirectObject, 100).unwrap();

        let mut heap = container
            .get_heap_with_required_size_and_alignment(HeapType::IndirectObject, 1024, 256)
            .unwrap();
        assert_eq!(heap.used(), 256);
        assert_eq!(heap.get_space(8).unwrap().offset, 256);
        drop(heap);

        let heap = container
            .get_heap_with_required_size_and_alignment(HeapType::IndirectObject, PAGE_SIZE_64K, 0)
            .unwrap();
        assert_eq!(heap.used(), 0);
        assert_eq!(heap.max_available_space(), 2 * PAGE_SIZE_64K);
    }

    #[test]
    fn test_grow_failure_is_reported() {
        let mut container = CommandContainer::new(
            device(SystemMemoryManager::with_budget(5 * PAGE_SIZE_64K)),
            config(),
        );
        assert_eq!(container.initialize(None, true), ErrorCode::Success);
        container.set_dirty_state_for_all_heaps(false);

        assert_eq!(
            container
                .get_heap_space_allow_grow(HeapType::SurfaceState, 2 * PAGE_SIZE_64K)
                .unwrap_err(),
            Error::OutOfDeviceMemory
        );
        assert!(!container.is_any_heap_dirty());
        assert!(container.deallocation_container().is_empty());
    }

    #[test]
    fn test_initialize_out_of_memory() {
        let mut container = CommandContainer::new(
            device(SystemMemoryManager::with_budget(PAGE_SIZE_64K)),
            config(),
        );
        assert_eq!(container.initialize(None, true), ErrorCode::OutOfDeviceMemory);
    }

    #[test]
    fn test_reserved_ssh_survives_grow_and_reset() {
        let mut container = CommandContainer::new(device(SystemMemoryManager::new()), config());
        container.set_reserved_ssh_size(4 * KILOBYTE);
        assert_eq!(container.initialize(None, true), ErrorCode::Success);

        let space = container.get_heap_space_allow_grow(HeapType::SurfaceState, 64).unwrap();
        assert_eq!(space.offset, 4 * KILOBYTE);

        container.get_heap_space_allow_grow(HeapType::SurfaceState, PAGE_SIZE_64K).unwrap();
        let heap = container.get_indirect_heap(HeapType::SurfaceState).unwrap();
        assert_eq!(heap.used(), 4 * KILOBYTE + PAGE_SIZE_64K);
        drop(heap);

        container.reset().unwrap();
        let heap = container.get_indirect_heap(HeapType::SurfaceState).unwrap();
        assert_eq!(heap.used(), 4 * KILOBYTE);
    }

    #[test]
    fn test_reserved_ssh_counted_when_creating_heap() {
        let mut container = CommandContainer::new(device(SystemMemoryManager::new()), config());
        container.set_reserved_ssh_size(4 * KILOBYTE);
        assert_eq!(container.initialize(None, false), ErrorCode::Success);

        let space = container
            .get_heap_space_allow_grow(HeapType::SurfaceState, PAGE_SIZE_64K)
            .unwrap();
        assert_eq!(space.offset, 4 * KILOBYTE);
        assert!(container.deallocation_container().is_empty());
    }

    #[test]
    fn test_reserved_ssh_counted_when_replacing_full_heap() {
        let mut container = CommandContainer::new(device(SystemMemoryManager::new()), config());
        container.set_reserved_ssh_size(4 * KILOBYTE);
        assert_eq!(container.initialize(None, true), ErrorCode::Success);
        container
            .get_heap_space_allow_grow(HeapType::SurfaceState, PAGE_SIZE_64K - 4 * KILOBYTE)
            .unwrap();

        let space = container
            .get_heap_space_allow_grow(HeapType::SurfaceState, 3 * PAGE_SIZE_64K)
            .unwrap();
        assert_eq!(space.offset, 4 * KILOBYTE);
        assert_eq!(container.deallocation_container().len(), 1);

        let heap = container.get_indirect_heap(HeapType::SurfaceState).unwrap();
        assert_eq!(heap.used(), 4 * KILOBYTE + 3 * PAGE_SIZE_64K);
        assert!(heap.max_available_space() >= heap.used());
    }

    #[test]
    fn test_reinitialize_forgets_released_buffers() {
        let mut container = container(true);
        let first = container.command_stream().graphics_allocation().unwrap().id();
        container.close_and_allocate_next_command_buffer().unwrap();
        let second = container.command_stream().graphics_allocation().unwrap().id();

        assert_eq!(container.initialize(None, false), ErrorCode::Success);
        let current = container.command_stream().graphics_allocation().unwrap().id();
        assert!(!container.residency_container().contains(first));
        assert!(!container.residency_container().contains(second));
        assert!(container.residency_container().contains(current));
        assert_eq!(container.cmd_buffer_allocations().count(), 1);
    }

    #[test]
    fn test_flush_task_owns_command_buffer_residency() {
        let mut container = CommandContainer::new(device(SystemMemoryManager::new()), config());
        container.set_flush_task_used_for_immediate(true);
        assert_eq!(container.initialize(None, false), ErrorCode::Success);
        assert!(container.residency_container().is_empty());

        container.close_and_allocate_next_command_buffer().unwrap();
        let external = container.obtain_next_command_buffer_allocation().unwrap();
        container.set_cmd_buffer(external);
        assert!(container.residency_container().is_empty());
        assert_eq!(container.cmd_buffer_allocations().count(), 3);
    }

    #[test]
    fn test_set_cmd_buffer_makes_buffer_resident() {
        let mut container = container(false);
        let external = container.obtain_next_command_buffer_allocation().unwrap();
        let id = external.id();
        container.set_cmd_buffer(external);

        assert_eq!(container.command_stream().graphics_allocation().unwrap().id(), id);
        assert!(container.residency_container().contains(id));
    }

    #[test]
    fn test_per_dispatch_state_resets() {
        let mut container = container(true);
        // Dg2 programs systolic mode
        assert!(container.systolic_mode_support);

        container.slm_size = 64 * KILOBYTE as u32;
        container.last_pipeline_select_mode_required = true;
        container.last_sent_use_global_atomics = true;
        container.reset().unwrap();

        assert_eq!(container.slm_size, u32::MAX);
        assert!(!container.last_pipeline_select_mode_required);
        assert!(!container.last_sent_use_global_atomics);
        assert!(container.systolic_mode_support);
    }

    #[test]
    fn test_reset_recycles_and_rewinds() {
        let dev = device(SystemMemoryManager::new());
        let list: SharedAllocationsList = Arc::new(Mutex::new(AllocationsList::new()));
        let mut container = CommandContainer::new(dev.clone(), config());
        assert_eq!(container.initialize(Some(list.clone()), true), ErrorCode::Success);

        let first = container.command_stream().graphics_allocation().unwrap().id();
        container.command_stream_mut().write_dwords(&[1, 2, 3]).unwrap();
        container.close_and_allocate_next_command_buffer().unwrap();
        container.close_and_allocate_next_command_buffer().unwrap();
        container.get_heap_space_allow_grow(HeapType::DynamicState, 2 * PAGE_SIZE_64K).unwrap();
        let block = container.get_heap_space_allow_grow(HeapType::DynamicState, 64).unwrap();
        container.set_idd_block(Some(block));
        container.set_dirty_state_for_all_heaps(false);

        container.reset().unwrap();
        assert_eq!(list.lock().len(), 2);
        assert_eq!(container.cmd_buffer_allocations().count(), 1);
        assert_eq!(container.command_stream().graphics_allocation().unwrap().id(), first);
        assert_eq!(container.command_stream().used(), 0);
        assert!(container.deallocation_container().is_empty());
        assert!(container.idd_block().is_none());
        assert_eq!(container.next_idd_in_block, container.num_idd_per_block());
        assert_eq!(container.dirty_heaps().bits(), u32::MAX);
        assert_eq!(container.residency_container().len(), 5);
    }

    #[test]
    fn test_heap_sharing_only_dsh_and_ssh() {
        let dev = device(SystemMemoryManager::new());
        let shared = receiver_heaps(&dev, PAGE_SIZE_64K);
        let mut container = CommandContainer::new(dev, config());
        container.enable_heap_sharing();
        container.set_immediate_cmd_list_csr_heaps(shared.clone());
        assert_eq!(container.initialize(None, true), ErrorCode::Success);

        assert!(container.indirect_heap_allocation(HeapType::SurfaceState).is_none());
        assert!(container.indirect_heap_allocation(HeapType::DynamicState).is_none());
        assert!(container.indirect_heap_allocation(HeapType::IndirectObject).is_some());
        assert!(!container.immediate_cmd_list_shared_heap(HeapType::Instruction));

        let space = container.get_heap_space_allow_grow(HeapType::SurfaceState, 64).unwrap();
        assert_eq!(space.allocation_id, shared.surface_state.lock().allocation().id());
        assert_eq!(shared.surface_state.lock().used(), 64);
    }

    #[test]
    #[should_panic(expected = "unrecoverable")]
    fn test_shared_heap_overflow_is_fatal() {
        let dev = device(SystemMemoryManager::new());
        let shared = receiver_heaps(&dev, 4 * KILOBYTE);
        let mut container = CommandContainer::new(dev, config());
        container.enable_heap_sharing();
        container.set_immediate_cmd_list_csr_heaps(shared);
        assert_eq!(container.initialize(None, true), ErrorCode::Success);

        let _ = container.get_heap_space_allow_grow(HeapType::DynamicState, 8 * KILOBYTE);
    }

    #[test]
    fn test_reserve_space_for_dispatch_grows_shared_heap() {
        let dev = device(SystemMemoryManager::new());
        let shared = receiver_heaps(&dev, 4 * KILOBYTE);
        let mut container = CommandContainer::new(dev, config());
        container.enable_heap_sharing();
        container.set_immediate_cmd_list_csr_heaps(shared.clone());
        assert_eq!(container.initialize(None, true), ErrorCode::Success);
        container.set_dirty_state_for_all_heaps(false);

        let mut ssh_args = HeapReserveArguments::new(8 * KILOBYTE, 64);
        let mut dsh_args = HeapReserveArguments::new(256, 64);
        container
            .reserve_space_for_dispatch(&mut ssh_args, &mut dsh_args, false)
            .unwrap();

        let window = ssh_args.reservation.unwrap();
        assert!(dsh_args.reservation.is_none());
        assert_eq!(window.size(), 8 * KILOBYTE);
        assert_eq!(container.dirty_heaps(), DirtyHeaps::SURFACE_STATE);
        assert_eq!(container.deallocation_container().len(), 1);
        assert_eq!(shared.surface_state.lock().used(), 8 * KILOBYTE);
    }

    #[test]
    fn test_fixed_shared_heap_is_not_replaced() {
        let dev = device(SystemMemoryManager::new());
        let shared = receiver_heaps_with_policy(&dev, 4 * KILOBYTE, false);
        let mut container = CommandContainer::new(dev, config());
        container.enable_heap_sharing();
        container.set_immediate_cmd_list_csr_heaps(shared.clone());
        assert_eq!(container.initialize(None, true), ErrorCode::Success);
        container.set_dirty_state_for_all_heaps(false);
        let before = shared.surface_state.lock().allocation().id();

        let mut ssh_args = HeapReserveArguments::new(8 * KILOBYTE, 64);
        let mut dsh_args = HeapReserveArguments::default();
        assert_eq!(
            container.reserve_space_for_dispatch(&mut ssh_args, &mut dsh_args, false),
            Err(Error::HeapExhausted)
        );
        assert!(ssh_args.reservation.is_none());
        assert!(!container.is_any_heap_dirty());
        assert!(container.deallocation_container().is_empty());
        assert_eq!(shared.surface_state.lock().allocation().id(), before);
    }

    #[test]
    fn test_reservation_windows_do_not_overlap_later_space() {
        let mut container = container(true);
        let mut ssh_args = HeapReserveArguments::new(512, 64);
        let mut dsh_args = HeapReserveArguments::new(256, 64);
        container.get_heap_space_allow_grow(HeapType::SurfaceState, 10).unwrap();
        container
            .reserve_space_for_dispatch(&mut ssh_args, &mut dsh_args, true)
            .unwrap();

        let mut window = ssh_args.reservation.unwrap();
        assert_eq!(window.base_offset(), 64);
        assert!(dsh_args.reservation.is_some());

        let after = container.get_heap_space_allow_grow(HeapType::SurfaceState, 16).unwrap();
        assert_eq!(after.offset, 64 + 512);

        let slot = window.get_space(64).unwrap();
        container.write_heap(&slot, &[7; 8]).unwrap();
        assert_eq!(window.get_space(512).unwrap_err(), Error::HeapExhausted);
    }

    #[test]
    fn test_destroy_returns_memory() {
        let dev = device(SystemMemoryManager::with_budget(8 * PAGE_SIZE_64K));
        {
            let mut container = CommandContainer::new(dev.clone(), config());
            assert_eq!(container.initialize(None, true), ErrorCode::Success);
            container.get_heap_space_allow_grow(HeapType::SurfaceState, 2 * PAGE_SIZE_64K).unwrap();
        }
        // the budget only fits a second container if the first freed everything
        let mut container = CommandContainer::new(dev, config());
        assert_eq!(container.initialize(None, true), ErrorCode::Success);
    }
}
