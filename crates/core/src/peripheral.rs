// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::regs::{offsets, CtrlFlags};
use crate::{BufferMemory, FeedResult, RegisterBackend};
use memfeed_config::SimulationConfig;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingTransfer {
    pub address: u32,
    pub bytes: u32,
}

/// Behavioral model of the memory reader.
///
/// A START write queues the programmed buffer; `tick` consumes queued
/// buffers from memory and checks that their words continue the counter
/// sequence of the previous transfer.
#[derive(Debug, Serialize)]
pub struct SimMemoryReader {
    memory_baseaddr_lo: u32,
    memory_baseaddr_hi: u32,
    memory_size_lo: u32,
    memory_size_hi: u32,
    fifo: VecDeque<PendingTransfer>,
    fifo_limit: u32,
    drain_per_tick: u32,
    freq_hz: u32,
    transferred_size: u64,
    valid_count: u32,
    query_count: u32,
    data_count: u64,
    expected_next: Option<u64>,
    dropped_starts: u64,
}

impl SimMemoryReader {
    pub fn new(fifo_limit: u32, drain_per_tick: u32, freq_hz: u32) -> Self {
        Self {
            memory_baseaddr_lo: 0,
            memory_baseaddr_hi: 0,
            memory_size_lo: 0,
            memory_size_hi: 0,
            fifo: VecDeque::new(),
            fifo_limit,
            drain_per_tick,
            freq_hz,
            transferred_size: 0,
            valid_count: 0,
            query_count: 0,
            data_count: 0,
            expected_next: None,
            dropped_starts: 0,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.fifo_limit, config.drain_per_tick, config.freq_hz)
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingTransfer> {
        self.fifo.iter()
    }

    /// START writes that arrived while the FIFO was full.
    pub fn dropped_starts(&self) -> u64 {
        self.dropped_starts
    }

    pub fn set_drain_per_tick(&mut self, drain: u32) {
        self.drain_per_tick = drain;
    }

    /// Consume up to `drain_per_tick` queued transfers. Returns how many were consumed.
    pub fn tick(&mut self, memory: &dyn BufferMemory) -> FeedResult<u32> {
        let mut drained = 0;
        while drained < self.drain_per_tick {
            let Some(transfer) = self.fifo.pop_front() else {
                break;
            };
            self.consume(transfer, memory)?;
            drained += 1;
        }
        Ok(drained)
    }

    /// Consume everything queued.
    pub fn drain_all(&mut self, memory: &dyn BufferMemory) -> FeedResult<u32> {
        let mut drained = 0;
        while let Some(transfer) = self.fifo.pop_front() {
            self.consume(transfer, memory)?;
            drained += 1;
        }
        Ok(drained)
    }

    fn consume(&mut self, transfer: PendingTransfer, memory: &dyn BufferMemory) -> FeedResult<()> {
        let words = transfer.bytes / 8;
        let mut in_sequence = true;
        for i in 0..words {
            let value = memory.read_u64(transfer.address as u64 + i as u64 * 8)?;
            if let Some(expected) = self.expected_next {
                if value != expected {
                    if in_sequence {
                        tracing::warn!(
                            "Transfer {:#010x}: word {} is {} (expected {})",
                            transfer.address,
                            i,
                            value,
                            expected
                        );
                    }
                    in_sequence = false;
                }
            }
            self.expected_next = Some(value.wrapping_add(1));
        }

        self.transferred_size += transfer.bytes as u64;
        self.data_count += words as u64;
        self.query_count = self.query_count.wrapping_add(1);
        if in_sequence {
            self.valid_count = self.valid_count.wrapping_add(1);
        }
        Ok(())
    }

    fn start(&mut self) {
        let transfer = PendingTransfer {
            address: self.memory_baseaddr_lo,
            bytes: self.memory_size_lo,
        };
        if self.fifo.len() as u32 >= self.fifo_limit {
            self.dropped_starts += 1;
            tracing::warn!(
                "START while FIFO full ({}/{}); dropped {:#010x}",
                self.fifo.len(),
                self.fifo_limit,
                transfer.address
            );
            return;
        }
        self.fifo.push_back(transfer);
    }

    fn reset(&mut self) {
        self.fifo.clear();
        self.transferred_size = 0;
        self.valid_count = 0;
        self.query_count = 0;
        self.data_count = 0;
        self.expected_next = None;
        self.dropped_starts = 0;
    }

    fn read_reg(&self, offset: u64) -> u32 {
        match offset {
            offsets::QUERY_FIFO_VOLUME => self.fifo.len() as u32,
            offsets::QUERY_FIFO_LIMIT => self.fifo_limit,
            offsets::TRANSFERRED_SIZE_LO => self.transferred_size as u32,
            offsets::TRANSFERRED_SIZE_HI => (self.transferred_size >> 32) as u32,
            offsets::FREQ_HZ => self.freq_hz,
            offsets::VALID_COUNT => self.valid_count,
            offsets::QUERY_COUNT => self.query_count,
            offsets::DATA_COUNT_LO => self.data_count as u32,
            offsets::DATA_COUNT_HI => (self.data_count >> 32) as u32,
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: u64, value: u32) {
        match offset {
            offsets::RESET_REG => {
                if value & 1 != 0 {
                    self.reset();
                }
            }
            offsets::MEMORY_BASEADDR_LO => self.memory_baseaddr_lo = value,
            offsets::MEMORY_BASEADDR_HI => self.memory_baseaddr_hi = value,
            offsets::MEMORY_SIZE_LO => self.memory_size_lo = value,
            offsets::MEMORY_SIZE_HI => self.memory_size_hi = value,
            offsets::CTRL_REG => {
                // START is self-clearing
                if CtrlFlags::from_bits_truncate(value).contains(CtrlFlags::START) {
                    self.start();
                }
            }
            _ => {}
        }
    }
}

impl RegisterBackend for SimMemoryReader {
    fn read_u32(&self, offset: u64) -> FeedResult<u32> {
        Ok(self.read_reg(offset))
    }

    fn write_u32(&mut self, offset: u64, value: u32) -> FeedResult<()> {
        self.write_reg(offset, value);
        Ok(())
    }
}
