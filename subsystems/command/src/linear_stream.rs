//! # Linear Stream
//!
//! Write cursor over the current command buffer. The stream owns the buffer
//! while it is being filled; the allocator takes it back when the buffer is
//! closed.
//!
//! ```text
//!  gpu_base                      used          max_available   size
//!  │◀──────── commands ─────────▶│◀── free ───▶│◀─ trailer ──▶│
//! ```
//!
//! Writes never cross `max_available`. The trailer only receives the
//! epilogue that ends or chains the buffer.

use forge_core::{Error, GpuAddr, Result};
use forge_memory::GraphicsAllocation;

/// Command dwords the stream writes itself
pub mod epilogue {
    /// Ends the batch
    pub const BATCH_BUFFER_END: u32 = 0x0500_0000;
    /// Jumps to another batch, followed by a 64-bit address
    pub const BATCH_BUFFER_START: u32 = 0x1880_0001;
    /// Bytes of a chained start
    pub const BATCH_BUFFER_START_SIZE: usize = 12;
}

/// Cursor over a command buffer
#[derive(Debug, Default)]
pub struct LinearStream {
    allocation: Option<GraphicsAllocation>,
    used: usize,
    max_available: usize,
}

impl LinearStream {
    /// Stream without a buffer
    pub const fn new() -> Self {
        Self {
            allocation: None,
            used: 0,
            max_available: 0,
        }
    }

    /// Stream over `allocation` with `max_available` writable bytes
    pub fn with_allocation(allocation: GraphicsAllocation, max_available: usize) -> Self {
        let mut stream = Self::new();
        stream.replace_buffer(allocation, max_available);
        stream
    }

    /// Switch to another buffer and rewind. Returns the previous one.
    pub fn replace_buffer(
        &mut self,
        allocation: GraphicsAllocation,
        max_available: usize,
    ) -> Option<GraphicsAllocation> {
        self.max_available = max_available.min(allocation.size());
        self.used = 0;
        self.allocation.replace(allocation)
    }

    /// Give up the buffer
    pub fn take_allocation(&mut self) -> Option<GraphicsAllocation> {
        self.used = 0;
        self.max_available = 0;
        self.allocation.take()
    }

    /// Current buffer
    #[inline]
    pub fn graphics_allocation(&self) -> Option<&GraphicsAllocation> {
        self.allocation.as_ref()
    }

    /// Bytes written
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Writable capacity
    #[inline]
    pub fn max_available_space(&self) -> usize {
        self.max_available
    }

    /// Bytes left before the trailer
    #[inline]
    pub fn available_space(&self) -> usize {
        self.max_available - self.used
    }

    /// GPU address of the buffer start
    pub fn gpu_base(&self) -> GpuAddr {
        self.allocation
            .as_ref()
            .map_or(GpuAddr::null(), GraphicsAllocation::gpu_address)
    }

    /// GPU address of the next byte written
    pub fn current_gpu_address(&self) -> GpuAddr {
        self.gpu_base().offset(self.used as u64)
    }

    /// Rewind to the buffer start
    pub fn rewind(&mut self) {
        self.used = 0;
    }

    /// Hand out `size` bytes at the cursor
    pub fn get_space(&mut self, size: usize) -> Result<&mut [u8]> {
        let available = self.available_space();
        let allocation = self.allocation.as_mut().ok_or(Error::NotInitialized)?;
        if size > available {
            return Err(Error::CommandBufferFull);
        }
        let start = self.used;
        self.used += size;
        Ok(&mut allocation.memory_mut()[start..start + size])
    }

    /// Append raw bytes
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.get_space(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Append little-endian dwords
    pub fn write_dwords(&mut self, dwords: &[u32]) -> Result<()> {
        let space = self.get_space(dwords.len() * 4)?;
        for (chunk, dword) in space.chunks_exact_mut(4).zip(dwords) {
            chunk.copy_from_slice(&dword.to_le_bytes());
        }
        Ok(())
    }

    /// Bytes written so far
    pub fn bytes(&self) -> &[u8] {
        self.allocation
            .as_ref()
            .map_or(&[][..], |allocation| &allocation.memory()[..self.used])
    }

    /// Write the epilogue at the cursor. May run into the trailer.
    fn write_epilogue(&mut self, dwords: &[u32]) -> Result<()> {
        let start = self.used;
        let allocation = self.allocation.as_mut().ok_or(Error::NotInitialized)?;
        let end = start + dwords.len() * 4;
        let space = allocation
            .memory_mut()
            .get_mut(start..end)
            .ok_or(Error::CommandBufferFull)?;
        for (chunk, dword) in space.chunks_exact_mut(4).zip(dwords) {
            chunk.copy_from_slice(&dword.to_le_bytes());
        }
        Ok(())
    }

    /// End the batch here
    pub fn write_batch_buffer_end(&mut self) -> Result<()> {
        self.write_epilogue(&[epilogue::BATCH_BUFFER_END])
    }

    /// Chain the batch to `next`
    pub fn write_batch_buffer_start(&mut self, next: GpuAddr) -> Result<()> {
        let raw = next.raw();
        self.write_epilogue(&[epilogue::BATCH_BUFFER_START, raw as u32, (raw >> 32) as u32])
    }
}
