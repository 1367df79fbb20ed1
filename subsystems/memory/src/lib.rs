//! # FORGE Memory
//!
//! Graphics allocations and the memory regions command building writes into.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        FORGE Memory                             │
//! │                                                                 │
//! │  ┌──────────────────┐      ┌─────────────────────────────────┐  │
//! │  │  MemoryManager   │─────▶│  GraphicsAllocation             │  │
//! │  │  (device seam)   │      │  (single owner, CPU+GPU view)   │  │
//! │  └──────────────────┘      └───────────────┬─────────────────┘  │
//! │                                            │ owned by           │
//! │  ┌──────────────────┐      ┌───────────────▼─────────────────┐  │
//! │  │ AllocationsList  │      │  IndirectHeap                   │  │
//! │  │ (recycle list)   │      │  (DSH / IOH / SSH / ISH)        │  │
//! │  └──────────────────┘      └─────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ownership is always explicit: an allocation lives in exactly one place
//! (a heap, a command buffer sequence, a recycle list or a deallocation list)
//! and moves between them by value.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod allocation;
pub mod allocations_list;
pub mod device;
pub mod heap;
pub mod manager;

// Re-exports
pub use allocation::{AllocationId, AllocationProperties, AllocationType, GraphicsAllocation};
pub use allocations_list::AllocationsList;
pub use device::Device;
pub use heap::{HeapReservation, HeapSpace, HeapType, IndirectHeap};
pub use manager::{MemoryManager, SystemMemoryManager};
