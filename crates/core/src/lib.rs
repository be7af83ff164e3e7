// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod console;
pub mod controls;
pub mod feed;
pub mod memory;
pub mod metrics;
pub mod mmio;
pub mod pacing;
pub mod peripheral;
pub mod regs;
pub mod system;
pub mod words;


pub use controls::{ControlCommand, RuntimeControls};
pub use feed::{FeedLoop, FeedOptions, FeedState, LogAddress, StepOutcome, WindowPolicy};
pub use regs::MemoryReaderRegs;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Invalid control value: {0}")]
    InvalidControl(String),
    #[error("map error: {0}")]
    Map(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;

/// Trait representing a block of 32-bit memory-mapped registers.
///
/// Offsets are byte offsets from the start of the block. On hardware these
/// accesses never fail; host backends report out-of-range offsets.
pub trait RegisterBackend: std::fmt::Debug + Send {
    fn read_u32(&self, offset: u64) -> FeedResult<u32>;
    fn write_u32(&mut self, offset: u64, value: u32) -> FeedResult<()>;
}

impl<T: RegisterBackend + ?Sized> RegisterBackend for Box<T> {
    fn read_u32(&self, offset: u64) -> FeedResult<u32> {
        (**self).read_u32(offset)
    }

    fn write_u32(&mut self, offset: u64, value: u32) -> FeedResult<()> {
        (**self).write_u32(offset, value)
    }
}

/// Trait representing the memory window buffers are written into.
///
/// Addresses are absolute (physical) addresses as seen by the peripheral.
pub trait BufferMemory: Send {
    fn read_u64(&self, addr: u64) -> FeedResult<u64>;
    fn write_u64(&mut self, addr: u64, value: u64) -> FeedResult<()>;

    /// Make `[addr, addr + len)` visible to a bus master reading physical memory.
    fn flush_range(&mut self, addr: u64, len: u64) -> FeedResult<()>;
}

/// Trait for observing feed loop events in a modular way.
pub trait FeedObserver: std::fmt::Debug + Send + Sync {
    fn on_idle(&self) {}
    fn on_backpressure(&self, _fifo: regs::FifoStatus) {}
    fn on_wrap(&self, _reason: feed::WrapReason) {}
    fn on_submit(&self, _submission: &feed::Submission) {}
}
