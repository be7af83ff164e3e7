// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::feed::{FeedLoop, RunSummary};
use crate::memory::LinearMemory;
use crate::peripheral::SimMemoryReader;
use crate::regs::{MemoryReaderRegs, Telemetry};
use crate::words::WordSource;
use crate::FeedResult;
use anyhow::Context;
use memfeed_config::FeedConfig;

/// Host stand-in for the board: a simulated memory reader plus the RAM
/// behind the buffer window.
#[derive(Debug)]
pub struct SimSystem {
    pub regs: MemoryReaderRegs<SimMemoryReader>,
    pub memory: LinearMemory,
}

impl SimSystem {
    pub fn new(reader: SimMemoryReader, memory: LinearMemory) -> Self {
        Self {
            regs: MemoryReaderRegs::new(reader),
            memory,
        }
    }

    pub fn from_config(config: &FeedConfig) -> anyhow::Result<Self> {
        let memory_size = config.simulation_memory_size()?;
        let memory_size = usize::try_from(memory_size)
            .with_context(|| format!("Simulation memory of {} bytes is too large", memory_size))?;
        tracing::info!(
            "Simulated memory reader: fifo_limit={}, drain_per_tick={}, {} bytes at {:#010x}",
            config.simulation.fifo_limit,
            config.simulation.drain_per_tick,
            memory_size,
            config.window.base
        );
        Ok(Self::new(
            SimMemoryReader::from_config(&config.simulation),
            LinearMemory::new(memory_size, config.window.base),
        ))
    }

    /// Run the loop for `iterations`, letting the peripheral consume after every iteration.
    pub fn run<W: WordSource>(
        &mut self,
        feed: &mut FeedLoop<W>,
        iterations: u64,
    ) -> FeedResult<RunSummary> {
        feed.run_with(
            &mut self.regs,
            &mut self.memory,
            iterations,
            |regs, memory| regs.backend_mut().tick(&*memory).map(|_| ()),
        )
    }

    /// Let the peripheral consume everything still queued.
    pub fn drain(&mut self) -> FeedResult<u32> {
        self.regs.backend_mut().drain_all(&self.memory)
    }

    pub fn telemetry(&self) -> FeedResult<Telemetry> {
        self.regs.telemetry()
    }
}
