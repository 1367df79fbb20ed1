//! # FORGE Synchronization
//!
//! Completion tags and the waits that order work across engines and queues.
//!
//! ## Architecture
//!
//! ```text
//!   producer engine                             consumer engine
//!  ┌──────────────┐   writes context end   ┌──────────────────────┐
//!  │  dispatch    │ ─────────────────────▶ │ MI_SEMAPHORE_WAIT    │
//!  └──────┬───────┘                        │  ctx_end != 1        │
//!         │ get_tag                        └──────────▲───────────┘
//!  ┌──────▼──────────────┐                            │ program_*
//!  │   TagAllocator      │   TagNode   ┌──────────────┴─────────┐
//!  │  chunks of          │ ──────────▶ │ TimestampPacketContainer│
//!  │  TimestampPackets   │             │ CsrDependencies         │
//!  └─────────────────────┘             └────────────────────────┘
//! ```
//!
//! Waiting is always encoded into the consumer's command stream. Nothing in
//! this crate blocks the CPU.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod container;
pub mod csr_deps;
pub mod encoder;
pub mod helper;
pub mod tag_allocator;
pub mod timestamp_packet;

// Re-exports
pub use container::{TimestampPacketContainer, TimestampPacketDependencies};
pub use csr_deps::CsrDependencies;
pub use encoder::{CompareOperation, DependencyEncoder, Gen12LpEncoder, PostSyncMode};
pub use helper::AuxTranslationDirection;
pub use tag_allocator::{TagAllocator, TagAllocatorConfig, TagId, TagNode, TagState};
pub use timestamp_packet::{Packet, TimestampPackets, INITIAL_VALUE, PREFERRED_PACKET_COUNT};
