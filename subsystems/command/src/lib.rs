//! # FORGE Command System
//!
//! The memory a dispatch is written into: command buffers and state heaps,
//! plus the bookkeeping the submission layer consumes.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       CommandContainer                            │
//! │                                                                   │
//! │  ┌──────────────────────┐   ┌──────────────────────────────────┐  │
//! │  │ CommandBufferAllocator│   │ Heaps [DSH, IOH, SSH, ISH]       │  │
//! │  │  LinearStream ──────▶ │   │  owned, or DSH/SSH shared with   │  │
//! │  │  closed buffers       │   │  the immediate receiver          │  │
//! │  └──────────┬───────────┘   └───────────────┬──────────────────┘  │
//! │             │ recycle                       │ grow                │
//! │  ┌──────────▼───────────┐   ┌───────────────▼──────────────────┐  │
//! │  │  AllocationsList     │   │ dirty mask · residency set ·     │  │
//! │  │  (device shared)     │   │ deallocation list                │  │
//! │  └──────────────────────┘   └──────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Build Flow
//!
//! 1. `initialize` allocates the first command buffer and the heaps
//! 2. The encoder writes commands through [`LinearStream`] and heap space
//!    through `get_heap_space_allow_grow`
//! 3. A full buffer is chained to the next with `close_and_allocate_next_command_buffer`
//! 4. Submission consumes buffers, residency and deallocations
//! 5. `reset` recycles everything but the first buffer
//!
//! A container is built by one thread at a time; it has no internal locking
//! except around the device-shared recycle list.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod cmd_buffer;
pub mod config;
pub mod container;
pub mod linear_stream;
pub mod residency;

// Re-exports
pub use cmd_buffer::CommandBufferAllocator;
pub use config::CommandContainerConfig;
pub use container::{
    CommandContainer, CsrSharedHeaps, DirtyHeaps, ErrorCode, HeapGuard, HeapReserveArguments,
};
pub use linear_stream::LinearStream;
pub use residency::ResidencyContainer;
