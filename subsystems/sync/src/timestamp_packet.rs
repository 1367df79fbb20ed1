//! # Timestamp Packets
//!
//! The record a GPU engine writes when work completes. Every field starts at
//! the sentinel [`INITIAL_VALUE`] and is overwritten in place by the engine.
//!
//! ```text
//! offset  0        4            8           12          16
//!         ┌────────┬────────────┬───────────┬───────────┐
//!         │ ctx    │ global     │ ctx       │ global    │  packet 0
//!         │ start  │ start      │ end       │ end       │
//!         ├────────┴────────────┴───────────┴───────────┤
//!         │                    ...                      │  packet 1..N
//!         └─────────────────────────────────────────────┘
//! ```
//!
//! The layout is consumed by hardware: no padding, 4-byte fields.

// Pod/Zeroable derives expand to unsafe impls
#![allow(unsafe_code)]

use core::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use forge_core::{Error, Result};

/// Value of every field until the GPU writes it
pub const INITIAL_VALUE: u32 = 1;

/// Packets in one tag. One per tile or partition a dispatch spans.
pub const PREFERRED_PACKET_COUNT: usize = 16;

/// One packet
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Packet {
    /// Context-local clock at start
    pub context_start: u32,
    /// Global clock at start
    pub global_start: u32,
    /// Context-local clock at end
    pub context_end: u32,
    /// Global clock at end
    pub global_end: u32,
}

impl Packet {
    /// Packet nobody has written yet
    pub const INITIAL: Self = Self {
        context_start: INITIAL_VALUE,
        global_start: INITIAL_VALUE,
        context_end: INITIAL_VALUE,
        global_end: INITIAL_VALUE,
    };

    /// Whether the engine has signaled the end of work
    #[inline]
    pub const fn is_completed(&self) -> bool {
        self.context_end != INITIAL_VALUE
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Storage of one tag
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct TimestampPackets {
    packets: [Packet; PREFERRED_PACKET_COUNT],
}

const_assert_eq!(size_of::<Packet>(), 4 * size_of::<u32>());
const_assert_eq!(
    size_of::<TimestampPackets>(),
    4 * PREFERRED_PACKET_COUNT * size_of::<u32>()
);

impl Default for TimestampPackets {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampPackets {
    /// Bytes of one tag
    pub const SIZE: usize = size_of::<Self>();

    /// Every packet at the sentinel
    pub const fn new() -> Self {
        Self {
            packets: [Packet::INITIAL; PREFERRED_PACKET_COUNT],
        }
    }

    /// Bytes between consecutive packets
    #[inline]
    pub const fn single_packet_size() -> usize {
        size_of::<Packet>()
    }

    /// Offset of the context start field within a packet
    #[inline]
    pub const fn context_start_offset() -> usize {
        offset_of!(Packet, context_start)
    }

    /// Offset of the global start field within a packet
    #[inline]
    pub const fn global_start_offset() -> usize {
        offset_of!(Packet, global_start)
    }

    /// Offset of the context end field within a packet
    #[inline]
    pub const fn context_end_offset() -> usize {
        offset_of!(Packet, context_end)
    }

    /// Offset of the global end field within a packet
    #[inline]
    pub const fn global_end_offset() -> usize {
        offset_of!(Packet, global_end)
    }

    /// Reset every packet to the sentinel
    pub fn initialize(&mut self) {
        self.packets = [Packet::INITIAL; PREFERRED_PACKET_COUNT];
    }

    /// Overwrite one packet, as the engine would
    pub fn assign_data_to_all_timestamps(&mut self, packet_index: usize, source: &Packet) -> Result<()> {
        let packet = self
            .packets
            .get_mut(packet_index)
            .ok_or(Error::InvalidParameter)?;
        *packet = *source;
        Ok(())
    }

    /// Packet `index`, if the tag has one
    #[inline]
    pub fn packet(&self, index: usize) -> Option<&Packet> {
        self.packets.get(index)
    }

    /// Context start of packet `index`
    pub fn context_start_value(&self, index: usize) -> Option<u64> {
        self.packet(index).map(|p| u64::from(p.context_start))
    }

    /// Global start of packet `index`
    pub fn global_start_value(&self, index: usize) -> Option<u64> {
        self.packet(index).map(|p| u64::from(p.global_start))
    }

    /// Context end of packet `index`
    pub fn context_end_value(&self, index: usize) -> Option<u64> {
        self.packet(index).map(|p| u64::from(p.context_end))
    }

    /// Global end of packet `index`
    pub fn global_end_value(&self, index: usize) -> Option<u64> {
        self.packet(index).map(|p| u64::from(p.global_end))
    }

    /// Whether the first `packets_used` packets have all been signaled
    pub fn is_completed(&self, packets_used: usize) -> bool {
        let used = packets_used.min(PREFERRED_PACKET_COUNT);
        self.packets[..used].iter().all(Packet::is_completed)
    }

    /// Raw bytes in GPU layout
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Read a tag out of GPU memory. `bytes` need not be aligned.
    pub fn read_from(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&bytes[..Self::SIZE])
    }
}
