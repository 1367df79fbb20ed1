//! # Tag Allocator
//!
//! Pool of timestamp packet tags. The pool owns the GPU memory the tags live
//! in; callers only ever hold [`TagNode`] descriptors.
//!
//! ## Node Lifecycle
//!
//! ```text
//!            get_tag                 mark_enqueued
//!   ┌──────┐ ───────▶ ┌────────────┐ ─────────────▶ ┌───────────────────┐
//!   │ Free │          │ CheckedOut │                │ PendingCompletion │
//!   └──────┘ ◀─────── └────────────┘                └─────────┬─────────┘
//!       ▲   last release                                      │ last release
//!       │   (never enqueued)                                  ▼ and GPU signaled
//!       └──────────────────────── reclaim ◀──────────── deferred list
//! ```
//!
//! A node is never handed out again while a reference is held or while the
//! GPU may still write it. Every checkout bumps the slot's generation, so a
//! descriptor kept from an earlier checkout is rejected as unknown.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use forge_core::types::memory_constants::PAGE_SIZE_64K;
use forge_core::{unrecoverable_if, Error, GpuAddr, Handle, Result};
use forge_memory::{AllocationId, AllocationProperties, AllocationType, Device, GraphicsAllocation};

use crate::timestamp_packet::{Packet, TimestampPackets, PREFERRED_PACKET_COUNT};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagAllocatorConfig {
    /// Tags carved out of one backing allocation
    pub tags_per_chunk: usize,
    /// Packets a fresh tag reports as used
    pub packets_used: u32,
}

impl Default for TagAllocatorConfig {
    fn default() -> Self {
        Self {
            tags_per_chunk: 64,
            packets_used: 1,
        }
    }
}

// =============================================================================
// NODES
// =============================================================================

/// Tag identifier
pub type TagId = Handle<TagNode>;

/// Where a tag is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagState {
    /// Available for `get_tag`
    Free,
    /// Assigned to a writer that has not finished enqueueing
    CheckedOut,
    /// Enqueued, the GPU has not necessarily signaled yet
    PendingCompletion,
}

/// Descriptor of a checked out tag
///
/// Cloned into dependency containers. The packet count is shared with the
/// pool record, so every clone sees [`TagAllocator::set_packets_used`].
/// The pool stays the only owner of the storage and the bookkeeping.
#[derive(Debug, Clone)]
pub struct TagNode {
    id: TagId,
    generation: u32,
    gpu_address: GpuAddr,
    packets_used: Arc<AtomicU32>,
}

impl PartialEq for TagNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}

impl Eq for TagNode {}

impl TagNode {
    /// Identifier in the owning pool
    #[inline]
    pub fn id(&self) -> TagId {
        self.id
    }

    /// GPU address of packet 0
    #[inline]
    pub fn gpu_address(&self) -> GpuAddr {
        self.gpu_address
    }

    /// Checkout this descriptor belongs to
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Packets the writer uses
    #[inline]
    pub fn packets_used(&self) -> u32 {
        self.packets_used.load(Ordering::Acquire)
    }

    /// Bytes between packets
    #[inline]
    pub const fn single_packet_size(&self) -> usize {
        TimestampPackets::single_packet_size()
    }

    /// Context start field of packet 0
    pub fn context_start_gpu_address(&self) -> GpuAddr {
        self.gpu_address
            .offset(TimestampPackets::context_start_offset() as u64)
    }

    /// Global start field of packet 0
    pub fn global_start_gpu_address(&self) -> GpuAddr {
        self.gpu_address
            .offset(TimestampPackets::global_start_offset() as u64)
    }

    /// Context end field of packet 0
    pub fn context_end_gpu_address(&self) -> GpuAddr {
        self.gpu_address
            .offset(TimestampPackets::context_end_offset() as u64)
    }

    /// Global end field of packet 0
    pub fn global_end_gpu_address(&self) -> GpuAddr {
        self.gpu_address
            .offset(TimestampPackets::global_end_offset() as u64)
    }
}

#[derive(Debug)]
struct TagRecord {
    chunk: usize,
    offset: usize,
    state: TagState,
    ref_count: u32,
    generation: u32,
    packets_used: Arc<AtomicU32>,
}

// =============================================================================
// TAG ALLOCATOR
// =============================================================================

/// Pool of timestamp packet tags backed by device memory
#[derive(Debug)]
pub struct TagAllocator {
    device: Arc<Device>,
    config: TagAllocatorConfig,
    chunks: Vec<GraphicsAllocation>,
    records: Vec<TagRecord>,
    free: Vec<usize>,
    deferred: Vec<usize>,
}

impl TagAllocator {
    /// Empty pool. Storage is allocated on first use.
    pub fn new(device: Arc<Device>, config: TagAllocatorConfig) -> Self {
        Self {
            device,
            config,
            chunks: Vec::new(),
            records: Vec::new(),
            free: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// Sizing
    #[inline]
    pub fn config(&self) -> &TagAllocatorConfig {
        &self.config
    }

    /// Check out a free tag, growing the pool if none is free
    pub fn get_tag(&mut self) -> Result<TagNode> {
        if self.free.is_empty() {
            self.reclaim();
        }
        if self.free.is_empty() {
            self.populate_free_list()?;
        }
        let index = self.free.pop().ok_or(Error::OutOfDeviceMemory)?;

        self.write_storage(index, &TimestampPackets::new());
        let packets_used = self.config.packets_used;
        let record = &mut self.records[index];
        record.state = TagState::CheckedOut;
        record.ref_count = 1;
        record.generation = record.generation.wrapping_add(1);
        record.packets_used.store(packets_used, Ordering::Release);

        Ok(self.node(index))
    }

    /// The writer finished enqueueing the work that signals `node`
    pub fn mark_enqueued(&mut self, node: &TagNode) -> Result<()> {
        let index = self.index_of(node)?;
        let record = &mut self.records[index];
        if record.state != TagState::CheckedOut {
            return Err(Error::InvalidTagState);
        }
        record.state = TagState::PendingCompletion;
        Ok(())
    }

    /// Set how many packets the writer spans. Visible through every clone
    /// of `node`, including those already in dependency containers.
    pub fn set_packets_used(&mut self, node: &TagNode, packets_used: u32) -> Result<()> {
        unrecoverable_if(
            packets_used as usize > PREFERRED_PACKET_COUNT,
            "packets used exceed tag capacity",
        );
        let index = self.index_of(node)?;
        let record = &self.records[index];
        if record.state != TagState::CheckedOut {
            return Err(Error::InvalidTagState);
        }
        record.packets_used.store(packets_used, Ordering::Release);
        Ok(())
    }

    /// Take another reference for a consumer
    pub fn increment_ref_count(&mut self, node: &TagNode) -> Result<()> {
        let index = self.index_of(node)?;
        let record = &mut self.records[index];
        if record.state == TagState::Free {
            return Err(Error::InvalidTagState);
        }
        record.ref_count += 1;
        Ok(())
    }

    /// Drop one reference. The last one hands the tag back to the pool.
    pub fn return_tag(&mut self, node: &TagNode) -> Result<()> {
        let index = self.index_of(node)?;
        let record = &mut self.records[index];
        if record.state == TagState::Free || record.ref_count == 0 {
            return Err(Error::InvalidTagState);
        }
        record.ref_count -= 1;
        if record.ref_count > 0 {
            return Ok(());
        }

        match record.state {
            TagState::CheckedOut => {
                log::trace!("tag {:?} released before enqueue", node.id);
                record.state = TagState::Free;
                self.free.push(index);
            }
            TagState::PendingCompletion => {
                if self.is_index_completed(index) {
                    self.release_to_free(index);
                } else {
                    self.deferred.push(index);
                }
            }
            TagState::Free => {}
        }
        Ok(())
    }

    /// Move every deferred tag the GPU has signaled back to the free list
    pub fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0;
        let mut i = 0;
        while i < self.deferred.len() {
            let index = self.deferred[i];
            if self.is_index_completed(index) {
                self.deferred.swap_remove(i);
                self.release_to_free(index);
                reclaimed += 1;
            } else {
                i += 1;
            }
        }
        if reclaimed > 0 {
            log::trace!("reclaimed {} tags", reclaimed);
        }
        reclaimed
    }

    /// Lifecycle state of `node`
    pub fn state(&self, node: &TagNode) -> Result<TagState> {
        Ok(self.records[self.index_of(node)?].state)
    }

    /// References held on `node`
    pub fn ref_count(&self, node: &TagNode) -> Result<u32> {
        Ok(self.records[self.index_of(node)?].ref_count)
    }

    /// Whether every used packet of `node` has been signaled
    pub fn is_completed(&self, node: &TagNode) -> Result<bool> {
        Ok(self.is_index_completed(self.index_of(node)?))
    }

    /// Current contents of `node`
    pub fn read(&self, node: &TagNode) -> Result<TimestampPackets> {
        Ok(self.read_storage(self.index_of(node)?))
    }

    /// Write one packet of `node` the way the engine would
    pub fn assign_data_to_all_timestamps(
        &mut self,
        node: &TagNode,
        packet_index: usize,
        source: &Packet,
    ) -> Result<()> {
        let index = self.index_of(node)?;
        let mut packets = self.read_storage(index);
        packets.assign_data_to_all_timestamps(packet_index, source)?;
        self.write_storage(index, &packets);
        Ok(())
    }

    /// Tags ready to hand out
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Tags released but still waiting for the GPU
    #[inline]
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Tags ever carved out
    #[inline]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Backing allocations, for residency
    pub fn graphics_allocations(&self) -> impl Iterator<Item = AllocationId> + '_ {
        self.chunks.iter().map(GraphicsAllocation::id)
    }

    /// Return all storage to the memory manager
    pub fn destroy(&mut self) {
        if self.chunks.is_empty() {
            return;
        }
        let mut memory_manager = self.device.memory_manager();
        for chunk in self.chunks.drain(..) {
            memory_manager.free_graphics_memory(chunk);
        }
        self.records.clear();
        self.free.clear();
        self.deferred.clear();
    }

    fn populate_free_list(&mut self) -> Result<()> {
        let tags = self.config.tags_per_chunk.max(1);
        let properties = AllocationProperties::new(
            tags * TimestampPackets::SIZE,
            PAGE_SIZE_64K,
            AllocationType::TimestampPacketTagBuffer,
        );
        let allocation = self
            .device
            .memory_manager()
            .allocate_graphics_memory(&properties)
            .inspect_err(|e| log::warn!("tag pool growth failed: {}", e))?;

        let chunk = self.chunks.len();
        self.chunks.push(allocation);
        let first = self.records.len();
        for i in 0..tags {
            self.records.push(TagRecord {
                chunk,
                offset: i * TimestampPackets::SIZE,
                state: TagState::Free,
                ref_count: 0,
                generation: 0,
                packets_used: Arc::new(AtomicU32::new(self.config.packets_used)),
            });
        }
        // hand out in ascending order
        self.free.extend((first..first + tags).rev());

        log::debug!("tag pool grew to {} tags", self.records.len());
        Ok(())
    }

    fn release_to_free(&mut self, index: usize) {
        self.records[index].state = TagState::Free;
        self.free.push(index);
    }

    fn is_index_completed(&self, index: usize) -> bool {
        let packets_used = self.records[index].packets_used.load(Ordering::Acquire) as usize;
        self.read_storage(index).is_completed(packets_used)
    }

    fn node(&self, index: usize) -> TagNode {
        let record = &self.records[index];
        TagNode {
            id: TagId::new(index as u64),
            generation: record.generation,
            gpu_address: self.chunks[record.chunk]
                .gpu_address()
                .offset(record.offset as u64),
            packets_used: record.packets_used.clone(),
        }
    }

    fn index_of(&self, node: &TagNode) -> Result<usize> {
        let index = node.id.id() as usize;
        match self.records.get(index) {
            Some(record) if record.generation == node.generation => Ok(index),
            _ => Err(Error::UnknownTag),
        }
    }

    fn read_storage(&self, index: usize) -> TimestampPackets {
        let record = &self.records[index];
        TimestampPackets::read_from(&self.chunks[record.chunk].memory()[record.offset..])
    }

    fn write_storage(&mut self, index: usize, packets: &TimestampPackets) {
        let (chunk, offset) = {
            let record = &self.records[index];
            (record.chunk, record.offset)
        };
        self.chunks[chunk].memory_mut()[offset..offset + TimestampPackets::SIZE]
            .copy_from_slice(packets.as_bytes());
    }
}

impl Drop for TagAllocator {
    fn drop(&mut self) {
        self.destroy();
    }
}
