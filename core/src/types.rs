//! # FORGE Core Types
//!
//! Strongly typed addresses, handles and the memory constants the
//! command-stream layout is built around.

use core::fmt;
use core::marker::PhantomData;
use core::ops::{Add, Sub};

// =============================================================================
// MEMORY CONSTANTS
// =============================================================================

/// Layout constants shared by command buffers, heaps and tag pools.
pub mod memory_constants {
    /// One kilobyte
    pub const KILOBYTE: usize = 1024;
    /// One megabyte
    pub const MEGABYTE: usize = 1024 * KILOBYTE;
    /// GPU cache line
    pub const CACHE_LINE_SIZE: usize = 64;
    /// Small page
    pub const PAGE_SIZE: usize = 4 * KILOBYTE;
    /// Large page, used for command buffer and heap backing
    pub const PAGE_SIZE_64K: usize = 64 * KILOBYTE;
}

/// Round `value` up to a power-of-two `alignment`.
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return value;
    }
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Check whether `value` is a multiple of a power-of-two `alignment`.
#[inline]
pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    alignment == 0 || value & (alignment - 1) == 0
}

// =============================================================================
// GPU ADDRESS
// =============================================================================

/// GPU virtual address
///
/// An address in the GPU's virtual address space. It is not a CPU pointer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct GpuAddr(u64);

impl GpuAddr {
    /// Create a new GPU address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Null GPU address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Raw value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check alignment
    #[inline]
    pub const fn is_aligned(self, alignment: u64) -> bool {
        self.0 & (alignment - 1) == 0
    }

    /// Offset by bytes
    #[inline]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl Add<u64> for GpuAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl Sub<GpuAddr> for GpuAddr {
    type Output = u64;

    fn sub(self, rhs: GpuAddr) -> Self::Output {
        self.0.wrapping_sub(rhs.0)
    }
}

impl fmt::Debug for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuAddr(0x{:016x})", self.0)
    }
}

impl fmt::Display for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

// =============================================================================
// HANDLE TYPES
// =============================================================================

/// Opaque, typed identifier
///
/// Handles name a resource without owning it. The owner (memory manager,
/// tag pool) is the only party that can resolve one back to storage.
#[repr(transparent)]
pub struct Handle<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Create a new handle
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Raw ID
    #[inline]
    pub const fn id(self) -> u64 {
        self.id
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> core::hash::Hash for Handle<T> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = core::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "Handle<{}>({})", short, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 4096), 4096);
        assert_eq!(align_up(17, 0), 17);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(128, 64));
        assert!(!is_aligned(100, 64));
        assert!(is_aligned(3, 0));
    }

    #[test]
    fn test_gpu_addr_offset() {
        let base = GpuAddr::new(0x1000);
        assert_eq!(base.offset(0x20).raw(), 0x1020);
        assert_eq!((base + 8) - base, 8);
        assert!(base.is_aligned(0x1000));
        assert!(GpuAddr::null().is_null());
    }

    #[test]
    fn test_handle_identity() {
        struct Marker;
        let a: Handle<Marker> = Handle::new(7);
        let b = a;
        assert_eq!(a, b);
        assert_eq!(b.id(), 7);
    }
}
