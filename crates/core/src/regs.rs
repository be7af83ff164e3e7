// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register map of the memory reader peripheral and a typed accessor over it.
//!
//! The block is a run of 32-bit registers starting at a fixed physical
//! address. Only the base/size/control/FIFO registers drive the feed loop;
//! the remaining ones are telemetry.

use crate::{FeedResult, RegisterBackend};
use bitflags::bitflags;
use serde::Serialize;

/// Memory reader register offsets
pub mod offsets {
    pub const RESET_REG: u64 = 0x00;
    pub const MEMORY_BASEADDR_LO: u64 = 0x04;
    pub const MEMORY_BASEADDR_HI: u64 = 0x08;
    pub const MEMORY_SIZE_LO: u64 = 0x0C;
    pub const MEMORY_SIZE_HI: u64 = 0x10;
    pub const CTRL_REG: u64 = 0x14;
    pub const QUERY_FIFO_VOLUME: u64 = 0x18;
    pub const QUERY_FIFO_LIMIT: u64 = 0x1C;
    pub const TRANSFERRED_SIZE_LO: u64 = 0x20;
    pub const TRANSFERRED_SIZE_HI: u64 = 0x24;
    pub const FREQ_HZ: u64 = 0x28;
    pub const VALID_COUNT: u64 = 0x2C;
    pub const QUERY_COUNT: u64 = 0x30;
    pub const DATA_COUNT_LO: u64 = 0x34;
    pub const DATA_COUNT_HI: u64 = 0x38;
}

/// Size of the register block in bytes.
pub const BLOCK_SIZE: u64 = 0x3C;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    WriteOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterInfo {
    pub name: &'static str,
    pub offset: u64,
    pub access: Access,
}

const fn reg(name: &'static str, offset: u64, access: Access) -> RegisterInfo {
    RegisterInfo {
        name,
        offset,
        access,
    }
}

pub const REGISTER_MAP: [RegisterInfo; 15] = [
    reg("reset_reg", offsets::RESET_REG, Access::WriteOnly),
    reg("memory_baseaddr_lo", offsets::MEMORY_BASEADDR_LO, Access::WriteOnly),
    reg("memory_baseaddr_hi", offsets::MEMORY_BASEADDR_HI, Access::WriteOnly),
    reg("memory_size_lo", offsets::MEMORY_SIZE_LO, Access::WriteOnly),
    reg("memory_size_hi", offsets::MEMORY_SIZE_HI, Access::WriteOnly),
    reg("ctrl_reg", offsets::CTRL_REG, Access::WriteOnly),
    reg("query_fifo_volume", offsets::QUERY_FIFO_VOLUME, Access::ReadOnly),
    reg("query_fifo_limit", offsets::QUERY_FIFO_LIMIT, Access::ReadOnly),
    reg("transferred_size_lo", offsets::TRANSFERRED_SIZE_LO, Access::ReadOnly),
    reg("transferred_size_hi", offsets::TRANSFERRED_SIZE_HI, Access::ReadOnly),
    reg("freq_hz", offsets::FREQ_HZ, Access::ReadOnly),
    reg("valid_count", offsets::VALID_COUNT, Access::ReadOnly),
    reg("query_count", offsets::QUERY_COUNT, Access::ReadOnly),
    reg("data_count_lo", offsets::DATA_COUNT_LO, Access::ReadOnly),
    reg("data_count_hi", offsets::DATA_COUNT_HI, Access::ReadOnly),
];

bitflags! {
    /// Bits of `ctrl_reg`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CtrlFlags: u32 {
        /// Start a transfer of the programmed buffer.
        const START = 1 << 0;
    }
}

/// One read of the FIFO handshake registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FifoStatus {
    pub volume: u32,
    pub limit: u32,
}

impl FifoStatus {
    /// True when the peripheral cannot accept another transfer.
    pub fn is_saturated(&self) -> bool {
        self.volume >= self.limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Telemetry {
    pub transferred_size: u64,
    pub freq_hz: u32,
    pub valid_count: u32,
    pub query_count: u32,
    pub data_count: u64,
}

/// Typed access to a memory reader register block.
#[derive(Debug)]
pub struct MemoryReaderRegs<B: RegisterBackend> {
    backend: B,
}

impl<B: RegisterBackend> MemoryReaderRegs<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn fifo_volume(&self) -> FeedResult<u32> {
        self.backend.read_u32(offsets::QUERY_FIFO_VOLUME)
    }

    pub fn fifo_limit(&self) -> FeedResult<u32> {
        self.backend.read_u32(offsets::QUERY_FIFO_LIMIT)
    }

    pub fn fifo_status(&self) -> FeedResult<FifoStatus> {
        Ok(FifoStatus {
            volume: self.fifo_volume()?,
            limit: self.fifo_limit()?,
        })
    }

    /// Program the buffer for the next transfer. The high halves are left untouched.
    pub fn set_buffer(&mut self, address: u32, bytes: u32) -> FeedResult<()> {
        self.backend.write_u32(offsets::MEMORY_BASEADDR_LO, address)?;
        self.backend.write_u32(offsets::MEMORY_SIZE_LO, bytes)
    }

    pub fn control(&mut self, flags: CtrlFlags) -> FeedResult<()> {
        self.backend.write_u32(offsets::CTRL_REG, flags.bits())
    }

    /// Program the buffer and trigger the transfer. Does not wait for completion.
    pub fn submit(&mut self, address: u32, bytes: u32) -> FeedResult<()> {
        self.set_buffer(address, bytes)?;
        self.control(CtrlFlags::START)
    }

    pub fn reset(&mut self) -> FeedResult<()> {
        self.backend.write_u32(offsets::RESET_REG, 1)
    }

    pub fn telemetry(&self) -> FeedResult<Telemetry> {
        Ok(Telemetry {
            transferred_size: self.read_pair(
                offsets::TRANSFERRED_SIZE_LO,
                offsets::TRANSFERRED_SIZE_HI,
            )?,
            freq_hz: self.backend.read_u32(offsets::FREQ_HZ)?,
            valid_count: self.backend.read_u32(offsets::VALID_COUNT)?,
            query_count: self.backend.read_u32(offsets::QUERY_COUNT)?,
            data_count: self.read_pair(offsets::DATA_COUNT_LO, offsets::DATA_COUNT_HI)?,
        })
    }

    fn read_pair(&self, lo: u64, hi: u64) -> FeedResult<u64> {
        let lo = self.backend.read_u32(lo)? as u64;
        let hi = self.backend.read_u32(hi)? as u64;
        Ok(lo | (hi << 32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct RecordingBackend {
        values: HashMap<u64, u32>,
        writes: Vec<(u64, u32)>,
    }

    impl RegisterBackend for RecordingBackend {
        fn read_u32(&self, offset: u64) -> FeedResult<u32> {
            Ok(self.values.get(&offset).copied().unwrap_or(0))
        }

        fn write_u32(&mut self, offset: u64, value: u32) -> FeedResult<()> {
            self.writes.push((offset, value));
            self.values.insert(offset, value);
            Ok(())
        }
    }

    #[test]
    fn test_register_map_is_sequential() {
        for (i, info) in REGISTER_MAP.iter().enumerate() {
            assert_eq!(info.offset, (i as u64) * 4, "{}", info.name);
        }
        assert_eq!(REGISTER_MAP.len() as u64 * 4, BLOCK_SIZE);
    }

    #[test]
    fn test_submit_write_order() {
        let mut regs = MemoryReaderRegs::new(RecordingBackend::default());
        regs.submit(0x1000_0018, 40).unwrap();

        assert_eq!(
            regs.backend().writes,
            vec![
                (offsets::MEMORY_BASEADDR_LO, 0x1000_0018),
                (offsets::MEMORY_SIZE_LO, 40),
                (offsets::CTRL_REG, 1),
            ]
        );
    }

    #[test]
    fn test_fifo_status_saturation() {
        let mut backend = RecordingBackend::default();
        backend.values.insert(offsets::QUERY_FIFO_VOLUME, 3);
        backend.values.insert(offsets::QUERY_FIFO_LIMIT, 4);
        let mut regs = MemoryReaderRegs::new(backend);

        let fifo = regs.fifo_status().unwrap();
        assert_eq!(fifo, FifoStatus { volume: 3, limit: 4 });
        assert!(!fifo.is_saturated());

        regs.backend_mut()
            .values
            .insert(offsets::QUERY_FIFO_VOLUME, 4);
        assert!(regs.fifo_status().unwrap().is_saturated());
    }

    #[test]
    fn test_telemetry_combines_halves() {
        let mut backend = RecordingBackend::default();
        backend.values.insert(offsets::TRANSFERRED_SIZE_LO, 0x10);
        backend.values.insert(offsets::TRANSFERRED_SIZE_HI, 0x2);
        backend.values.insert(offsets::DATA_COUNT_LO, 0xFFFF_FFFF);
        backend.values.insert(offsets::FREQ_HZ, 100_000_000);
        backend.values.insert(offsets::VALID_COUNT, 5);
        backend.values.insert(offsets::QUERY_COUNT, 6);
        let regs = MemoryReaderRegs::new(backend);

        let t = regs.telemetry().unwrap();
        assert_eq!(t.transferred_size, 0x2_0000_0010);
        assert_eq!(t.data_count, 0xFFFF_FFFF);
        assert_eq!(t.freq_hz, 100_000_000);
        assert_eq!(t.valid_count, 5);
        assert_eq!(t.query_count, 6);
    }
}
