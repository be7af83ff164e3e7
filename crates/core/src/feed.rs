// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! The reader feed loop.
//!
//! Each iteration either idles, stalls on FIFO backpressure, wraps the write
//! cursor back to the window base, or fills one buffer with consecutive
//! counter values and hands it to the memory reader. Wrap and fill never
//! happen in the same iteration.
//!
//! Two hazards are inherited from the hardware protocol and left visible:
//! a transfer is never checked for completion, and under
//! [`WindowPolicy::Coupled`] the cursor is not bounded by any address, only by
//! the number of submissions between wraps.

use crate::console::Console;
use crate::controls::RuntimeControls;
use crate::pacing::PollPolicy;
use crate::regs::{FifoStatus, MemoryReaderRegs};
use crate::words::{draw_nonzero, WordSource};
use crate::{BufferMemory, FeedObserver, FeedResult, RegisterBackend};
use memfeed_config::{FeedConfig, LogAddressKind, WindowPolicyKind};
use serde::Serialize;
use std::sync::Arc;

/// Bytes per counter slot.
pub const WORD_BYTES: u32 = 8;

/// Submissions per wrap, as a multiple of the FIFO limit.
pub const WRAP_FIFO_MULTIPLE: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WindowPolicy {
    /// Wrap only when `loop_reset` reaches `4 x fifo_limit`.
    #[default]
    Coupled,
    /// Additionally wrap before a buffer would end past `base + size`.
    Bounded { size: u64 },
}

/// Address reported by the progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAddress {
    /// The cursor after advancing, with the size of the next buffer.
    #[default]
    Advanced,
    /// The buffer that was just submitted.
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapReason {
    Threshold,
    AddressBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    pub window_base: u32,
    pub window_policy: WindowPolicy,
    pub log_address: LogAddress,
    pub poll: PollPolicy,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            window_base: memfeed_config::DEFAULT_WINDOW_BASE as u32,
            window_policy: WindowPolicy::default(),
            log_address: LogAddress::default(),
            poll: PollPolicy::default(),
        }
    }
}

impl FeedOptions {
    pub fn from_config(config: &FeedConfig) -> anyhow::Result<Self> {
        let window_base = u32::try_from(config.window.base).map_err(|_| {
            anyhow::anyhow!(
                "Window base {:#x} does not fit 32 bits",
                config.window.base
            )
        })?;
        let window_policy = match config.window.policy {
            WindowPolicyKind::Coupled => WindowPolicy::Coupled,
            WindowPolicyKind::Bounded => {
                let size = config
                    .window_size()?
                    .ok_or_else(|| anyhow::anyhow!("Bounded window requires a size"))?;
                WindowPolicy::Bounded { size }
            }
        };
        let log_address = match config.logging.address {
            LogAddressKind::Advanced => LogAddress::Advanced,
            LogAddressKind::Submitted => LogAddress::Submitted,
        };
        Ok(Self {
            window_base,
            window_policy,
            log_address,
            poll: PollPolicy::from_config(&config.poll),
        })
    }
}

/// State owned by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FeedState {
    /// Next value to write; equals the number of words written so far.
    pub counter: u64,
    pub reading_baseaddr: u32,
    pub reading_words: u32,
    pub reading_bytes: u32,
    /// Submissions since the last wrap.
    pub loop_reset: u32,
}

/// What one fill-and-submit iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub address: u32,
    pub words: u32,
    pub bytes: u32,
    /// Counter value stored in the first slot.
    pub first_value: u64,
    pub next_address: u32,
    pub next_words: u32,
    pub next_bytes: u32,
    /// FIFO snapshot taken before the transfer was triggered.
    pub fifo: FifoStatus,
}

impl Submission {
    /// The console line, `\r\n` terminated.
    pub fn progress_line(&self, log: LogAddress) -> String {
        let (address, words, bytes) = match log {
            LogAddress::Advanced => (self.next_address, self.next_words, self.next_bytes),
            LogAddress::Submitted => (self.address, self.words, self.bytes),
        };
        format!(
            "[{:2}/{:2}] address = 0x{:08x} size = {:7} words({:7} bytes)\r\n",
            self.fifo.volume, self.fifo.limit, address, words, bytes
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StepOutcome {
    /// `perform_reading` was off.
    Idle,
    Backpressure { fifo: FifoStatus },
    Wrapped { reason: WrapReason, fifo: FifoStatus },
    Submitted(Submission),
}

impl StepOutcome {
    /// Idle and backpressure iterations are followed by the poll pause.
    pub fn made_progress(&self) -> bool {
        matches!(self, Self::Wrapped { .. } | Self::Submitted(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub iterations: u64,
    pub idle: u64,
    pub backpressure: u64,
    pub wraps: u64,
    pub submissions: u64,
    pub words_written: u64,
    pub bytes_written: u64,
    pub final_state: FeedState,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &StepOutcome) {
        self.iterations += 1;
        match outcome {
            StepOutcome::Idle => self.idle += 1,
            StepOutcome::Backpressure { .. } => self.backpressure += 1,
            StepOutcome::Wrapped { .. } => self.wraps += 1,
            StepOutcome::Submitted(s) => {
                self.submissions += 1;
                self.words_written += s.words as u64;
                self.bytes_written += s.bytes as u64;
            }
        }
    }
}

pub struct FeedLoop<W: WordSource> {
    state: FeedState,
    options: FeedOptions,
    controls: RuntimeControls,
    words: W,
    console: Console,
    observers: Vec<Arc<dyn FeedObserver>>,
}

impl<W: WordSource> std::fmt::Debug for FeedLoop<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedLoop")
            .field("state", &self.state)
            .field("options", &self.options)
            .field("controls", &self.controls.snapshot())
            .finish()
    }
}

impl<W: WordSource> FeedLoop<W> {
    /// Create the loop with the cursor at the window base and a first
    /// nonzero buffer size drawn from the current divide factor.
    pub fn new(options: FeedOptions, controls: RuntimeControls, mut words: W) -> Self {
        let reading_words = draw_nonzero(&mut words, controls.divide_factor());
        Self {
            state: FeedState {
                counter: 0,
                reading_baseaddr: options.window_base,
                reading_words,
                reading_bytes: reading_words * WORD_BYTES,
                loop_reset: 0,
            },
            options,
            controls,
            words,
            console: Console::new(),
            observers: Vec::new(),
        }
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn FeedObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn controls(&self) -> &RuntimeControls {
        &self.controls
    }

    /// Run one iteration of the loop.
    pub fn step<R: RegisterBackend>(
        &mut self,
        regs: &mut MemoryReaderRegs<R>,
        memory: &mut dyn BufferMemory,
    ) -> FeedResult<StepOutcome> {
        if !self.controls.perform_reading() {
            for observer in &self.observers {
                observer.on_idle();
            }
            return Ok(StepOutcome::Idle);
        }

        let fifo = regs.fifo_status()?;
        if fifo.is_saturated() {
            tracing::trace!("FIFO saturated [{}/{}]", fifo.volume, fifo.limit);
            for observer in &self.observers {
                observer.on_backpressure(fifo);
            }
            return Ok(StepOutcome::Backpressure { fifo });
        }

        if self.state.loop_reset as u64 == fifo.limit as u64 * WRAP_FIFO_MULTIPLE {
            return Ok(self.wrap(WrapReason::Threshold, fifo));
        }

        if self.exceeds_window() {
            return Ok(self.wrap(WrapReason::AddressBound, fifo));
        }

        let submission = self.fill_and_submit(regs, memory, fifo)?;
        Ok(StepOutcome::Submitted(submission))
    }

    /// Run `iterations` iterations, pausing per the poll policy after every
    /// iteration that made no progress.
    pub fn run<R: RegisterBackend>(
        &mut self,
        regs: &mut MemoryReaderRegs<R>,
        memory: &mut dyn BufferMemory,
        iterations: u64,
    ) -> FeedResult<RunSummary> {
        self.run_with(regs, memory, iterations, |_, _| Ok(()))
    }

    /// Like [`FeedLoop::run`], calling `after_step` once per iteration. Host
    /// simulations use it to advance the peripheral model.
    pub fn run_with<R, F>(
        &mut self,
        regs: &mut MemoryReaderRegs<R>,
        memory: &mut dyn BufferMemory,
        iterations: u64,
        mut after_step: F,
    ) -> FeedResult<RunSummary>
    where
        R: RegisterBackend,
        F: FnMut(&mut MemoryReaderRegs<R>, &mut dyn BufferMemory) -> FeedResult<()>,
    {
        let mut summary = RunSummary::default();
        for _ in 0..iterations {
            let outcome = self.step(regs, memory)?;
            summary.record(&outcome);
            after_step(regs, memory)?;
            if !outcome.made_progress() {
                self.options.poll.pause();
            }
        }
        summary.final_state = self.state;
        Ok(summary)
    }

    /// Poll forever. Only returns if a backend reports an error.
    pub fn run_forever<R: RegisterBackend>(
        &mut self,
        regs: &mut MemoryReaderRegs<R>,
        memory: &mut dyn BufferMemory,
    ) -> FeedResult<()> {
        tracing::info!(
            "Feeding memory reader from {:#010x} ({:?})",
            self.options.window_base,
            self.options.window_policy
        );
        loop {
            let outcome = self.step(regs, memory)?;
            if !outcome.made_progress() {
                self.options.poll.pause();
            }
        }
    }

    fn wrap(&mut self, reason: WrapReason, fifo: FifoStatus) -> StepOutcome {
        tracing::debug!(
            "Wrapping cursor {:#010x} -> {:#010x} after {} submissions ({:?})",
            self.state.reading_baseaddr,
            self.options.window_base,
            self.state.loop_reset,
            reason
        );
        self.state.loop_reset = 0;
        self.state.reading_baseaddr = self.options.window_base;
        for observer in &self.observers {
            observer.on_wrap(reason);
        }
        StepOutcome::Wrapped { reason, fifo }
    }

    /// Under a bounded window: would the next buffer end past the window?
    /// A buffer starting at the base is always submitted.
    fn exceeds_window(&self) -> bool {
        let WindowPolicy::Bounded { size } = self.options.window_policy else {
            return false;
        };
        let base = self.options.window_base as u64;
        let start = self.state.reading_baseaddr as u64;
        let end = start + self.state.reading_bytes as u64;
        if end <= base + size {
            return false;
        }
        if start == base {
            tracing::warn!(
                "Buffer of {} bytes is larger than the {} byte window; submitting anyway",
                self.state.reading_bytes,
                size
            );
            return false;
        }
        true
    }

    fn fill_and_submit<R: RegisterBackend>(
        &mut self,
        regs: &mut MemoryReaderRegs<R>,
        memory: &mut dyn BufferMemory,
        fifo: FifoStatus,
    ) -> FeedResult<Submission> {
        let address = self.state.reading_baseaddr;
        let words = self.state.reading_words;
        let bytes = self.state.reading_bytes;
        let first_value = self.state.counter;

        // State is committed only once the transfer has been started
        let mut slot = address as u64;
        for value in first_value..first_value + words as u64 {
            memory.write_u64(slot, value)?;
            slot += WORD_BYTES as u64;
        }

        memory.flush_range(address as u64, bytes as u64)?;
        regs.submit(address, bytes)?;

        self.state.counter = first_value + words as u64;

        self.state.reading_baseaddr = address.wrapping_add(bytes);
        self.state.reading_words = draw_nonzero(&mut self.words, self.controls.divide_factor());
        self.state.reading_bytes = self.state.reading_words * WORD_BYTES;
        self.state.loop_reset += 1;

        let submission = Submission {
            address,
            words,
            bytes,
            first_value,
            next_address: self.state.reading_baseaddr,
            next_words: self.state.reading_words,
            next_bytes: self.state.reading_bytes,
            fifo,
        };

        tracing::debug!(
            "Submitted {:#010x} ({} words), counter {} -> {}",
            address,
            words,
            first_value,
            self.state.counter
        );

        if self.controls.dump_statistics() {
            self.console
                .emit(&submission.progress_line(self.options.log_address));
        }

        for observer in &self.observers {
            observer.on_submit(&submission);
        }

        Ok(submission)
    }
}
