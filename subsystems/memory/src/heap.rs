//! # State Heaps
//!
//! Linear regions holding one category of GPU-visible state. A heap never
//! grows in place: growing means replacing its allocation, and every offset
//! handed out before the replacement refers to the abandoned region.

use core::fmt;
use core::mem;

use forge_core::types::align_up;
use forge_core::{Error, GpuAddr, Result};

use crate::allocation::{AllocationId, AllocationType, GraphicsAllocation};

// =============================================================================
// HEAP TYPES
// =============================================================================

/// Heap category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum HeapType {
    /// Dynamic state heap (samplers, interface descriptors)
    DynamicState = 0,
    /// Indirect object heap (kernel cross-thread data)
    IndirectObject = 1,
    /// Surface state heap (binding tables, surface states)
    SurfaceState = 2,
    /// Instruction heap (kernel ISA)
    Instruction = 3,
}

impl HeapType {
    /// Number of categories
    pub const COUNT: usize = 4;

    /// All categories in index order
    pub const ALL: [HeapType; Self::COUNT] = [
        HeapType::DynamicState,
        HeapType::IndirectObject,
        HeapType::SurfaceState,
        HeapType::Instruction,
    ];

    /// Dense index, also the bit position in dirty masks
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Allocation type backing this category
    pub const fn allocation_type(self) -> AllocationType {
        match self {
            HeapType::Instruction | HeapType::IndirectObject => AllocationType::InternalHeap,
            HeapType::DynamicState | HeapType::SurfaceState => AllocationType::LinearStream,
        }
    }

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            HeapType::DynamicState => "DSH",
            HeapType::IndirectObject => "IOH",
            HeapType::SurfaceState => "SSH",
            HeapType::Instruction => "ISH",
        }
    }
}

impl fmt::Display for HeapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// HEAP SPACE
// =============================================================================

/// A window handed out by a heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSpace {
    /// Heap category
    pub heap_type: HeapType,
    /// Allocation the window lives in
    pub allocation_id: AllocationId,
    /// Offset from the heap base
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
    /// GPU address of the first byte
    pub gpu_address: GpuAddr,
}

// =============================================================================
// INDIRECT HEAP
// =============================================================================

/// One heap region
pub struct IndirectHeap {
    heap_type: HeapType,
    allocation: GraphicsAllocation,
    used: usize,
    /// Usable bytes, may be less than the allocation size
    max_available: usize,
    /// Whether running out of space replaces the region instead of failing
    allow_grow: bool,
}

impl IndirectHeap {
    /// Create a heap over an allocation
    pub fn new(heap_type: HeapType, allocation: GraphicsAllocation, allow_grow: bool) -> Self {
        let max_available = allocation.size();
        Self {
            heap_type,
            allocation,
            used: 0,
            max_available,
            allow_grow,
        }
    }

    /// Heap category
    #[inline]
    pub fn heap_type(&self) -> HeapType {
        self.heap_type
    }

    /// Whether this heap replaces its region when full
    #[inline]
    pub fn allows_grow(&self) -> bool {
        self.allow_grow
    }

    /// Backing allocation
    #[inline]
    pub fn allocation(&self) -> &GraphicsAllocation {
        &self.allocation
    }

    /// Mutable backing allocation
    #[inline]
    pub fn allocation_mut(&mut self) -> &mut GraphicsAllocation {
        &mut self.allocation
    }

    /// GPU base address
    #[inline]
    pub fn heap_gpu_base(&self) -> GpuAddr {
        self.allocation.gpu_address()
    }

    /// Bytes handed out
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Capacity
    #[inline]
    pub fn max_available_space(&self) -> usize {
        self.max_available
    }

    /// Bytes left
    #[inline]
    pub fn available_space(&self) -> usize {
        self.max_available - self.used
    }

    /// Rewind to `used` bytes
    pub fn set_used(&mut self, used: usize) -> Result<()> {
        if used > self.max_available {
            return Err(Error::InvalidParameter);
        }
        self.used = used;
        Ok(())
    }

    /// Rewind to the start of the region
    pub fn rewind(&mut self) {
        self.used = 0;
    }

    /// Pad the cursor up to `alignment`
    pub fn align(&mut self, alignment: usize) {
        self.used = align_up(self.used, alignment).min(self.max_available);
    }

    /// Hand out `size` bytes at the cursor
    pub fn get_space(&mut self, size: usize) -> Result<HeapSpace> {
        if size > self.available_space() {
            return Err(Error::HeapExhausted);
        }
        let offset = self.used;
        self.used += size;
        Ok(self.space_at(offset, size))
    }

    /// Carve a window that later writes fill without moving the cursor
    pub fn reserve(&mut self, size: usize, alignment: usize) -> Result<HeapReservation> {
        if alignment > 0 {
            self.align(alignment);
        }
        let space = self.get_space(size)?;
        Ok(HeapReservation {
            heap_type: self.heap_type,
            allocation_id: space.allocation_id,
            base_offset: space.offset,
            gpu_base: space.gpu_address,
            size,
            used: 0,
        })
    }

    /// Swap in a new region. Returns the abandoned one; nothing is copied.
    pub fn replace_allocation(&mut self, allocation: GraphicsAllocation) -> GraphicsAllocation {
        self.max_available = allocation.size();
        self.used = 0;
        mem::replace(&mut self.allocation, allocation)
    }

    /// Give up the backing allocation
    pub fn into_allocation(self) -> GraphicsAllocation {
        self.allocation
    }

    /// CPU view of a window handed out by this heap
    pub fn bytes_mut(&mut self, space: &HeapSpace) -> Result<&mut [u8]> {
        if space.allocation_id != self.allocation.id() {
            return Err(Error::InvalidParameter);
        }
        self.allocation
            .memory_mut()
            .get_mut(space.offset..space.offset + space.size)
            .ok_or(Error::InvalidParameter)
    }

    /// Copy `data` into a window handed out by this heap
    pub fn write(&mut self, space: &HeapSpace, data: &[u8]) -> Result<()> {
        if data.len() > space.size {
            return Err(Error::HeapExhausted);
        }
        self.bytes_mut(space)?[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn space_at(&self, offset: usize, size: usize) -> HeapSpace {
        HeapSpace {
            heap_type: self.heap_type,
            allocation_id: self.allocation.id(),
            offset,
            size,
            gpu_address: self.heap_gpu_base().offset(offset as u64),
        }
    }
}

impl fmt::Debug for IndirectHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndirectHeap")
            .field("type", &self.heap_type)
            .field("base", &self.heap_gpu_base())
            .field("used", &self.used)
            .field("capacity", &self.max_available)
            .field("allow_grow", &self.allow_grow)
            .finish()
    }
}

// =============================================================================
// HEAP RESERVATION
// =============================================================================

/// Fixed window inside a heap region
///
/// The window never relocates, so descriptor tables can be written into it
/// piecewise without a grow moving them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapReservation {
    heap_type: HeapType,
    allocation_id: AllocationId,
    base_offset: usize,
    gpu_base: GpuAddr,
    size: usize,
    used: usize,
}

impl HeapReservation {
    /// Heap category
    #[inline]
    pub fn heap_type(&self) -> HeapType {
        self.heap_type
    }

    /// Offset of the window inside its heap
    #[inline]
    pub fn base_offset(&self) -> usize {
        self.base_offset
    }

    /// GPU address of the window
    #[inline]
    pub fn gpu_base(&self) -> GpuAddr {
        self.gpu_base
    }

    /// Window size
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes handed out
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes left
    #[inline]
    pub fn available_space(&self) -> usize {
        self.size - self.used
    }

    /// Hand out `size` bytes. Never grows.
    pub fn get_space(&mut self, size: usize) -> Result<HeapSpace> {
        if size > self.available_space() {
            return Err(Error::HeapExhausted);
        }
        let offset = self.base_offset + self.used;
        self.used += size;
        Ok(HeapSpace {
            heap_type: self.heap_type,
            allocation_id: self.allocation_id,
            offset,
            size,
            gpu_address: self.gpu_base.offset((offset - self.base_offset) as u64),
        })
    }
}
