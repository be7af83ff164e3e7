// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{FeedError, FeedResult};
use memfeed_config::{ControlsConfig, MAX_DIVIDE_FACTOR, MIN_DIVIDE_FACTOR};
use serde::Serialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct ControlState {
    perform_reading: AtomicBool,
    divide_factor: AtomicU32,
    dump_statistics: AtomicBool,
}

/// Operator controls of the feed loop.
///
/// Cloning yields another handle to the same state, so a debug channel on
/// another thread can flip flags while the loop polls them. Each flag is
/// independent; the loop re-reads them on every iteration.
#[derive(Debug, Clone)]
pub struct RuntimeControls {
    inner: Arc<ControlState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlSnapshot {
    pub perform_reading: bool,
    pub divide_factor: u32,
    pub dump_statistics: bool,
}

impl Default for RuntimeControls {
    fn default() -> Self {
        Self::from_parts(false, memfeed_config::DEFAULT_DIVIDE_FACTOR, false)
    }
}

impl RuntimeControls {
    pub fn new(perform_reading: bool, divide_factor: u32, dump_statistics: bool) -> FeedResult<Self> {
        check_divide_factor(divide_factor)?;
        Ok(Self::from_parts(
            perform_reading,
            divide_factor,
            dump_statistics,
        ))
    }

    pub fn from_config(config: &ControlsConfig) -> FeedResult<Self> {
        Self::new(
            config.perform_reading,
            config.divide_factor,
            config.dump_statistics,
        )
    }

    fn from_parts(perform_reading: bool, divide_factor: u32, dump_statistics: bool) -> Self {
        Self {
            inner: Arc::new(ControlState {
                perform_reading: AtomicBool::new(perform_reading),
                divide_factor: AtomicU32::new(divide_factor),
                dump_statistics: AtomicBool::new(dump_statistics),
            }),
        }
    }

    pub fn perform_reading(&self) -> bool {
        self.inner.perform_reading.load(Ordering::Relaxed)
    }

    pub fn set_perform_reading(&self, enabled: bool) {
        self.inner.perform_reading.store(enabled, Ordering::Relaxed);
    }

    pub fn divide_factor(&self) -> u32 {
        self.inner.divide_factor.load(Ordering::Relaxed)
    }

    pub fn set_divide_factor(&self, divide_factor: u32) -> FeedResult<()> {
        check_divide_factor(divide_factor)?;
        self.inner
            .divide_factor
            .store(divide_factor, Ordering::Relaxed);
        Ok(())
    }

    pub fn dump_statistics(&self) -> bool {
        self.inner.dump_statistics.load(Ordering::Relaxed)
    }

    pub fn set_dump_statistics(&self, enabled: bool) {
        self.inner.dump_statistics.store(enabled, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            perform_reading: self.perform_reading(),
            divide_factor: self.divide_factor(),
            dump_statistics: self.dump_statistics(),
        }
    }

    pub fn apply(&self, command: ControlCommand) -> FeedResult<()> {
        match command {
            ControlCommand::Enable => self.set_perform_reading(true),
            ControlCommand::Disable => self.set_perform_reading(false),
            ControlCommand::Stats(enabled) => self.set_dump_statistics(enabled),
            ControlCommand::Divide(factor) => self.set_divide_factor(factor)?,
            ControlCommand::Status => {}
        }
        tracing::debug!("Applied control {:?}: {:?}", command, self.snapshot());
        Ok(())
    }
}

fn check_divide_factor(divide_factor: u32) -> FeedResult<()> {
    if !(MIN_DIVIDE_FACTOR..=MAX_DIVIDE_FACTOR).contains(&divide_factor) {
        return Err(FeedError::InvalidControl(format!(
            "divide_factor must be in {}..={} (got {})",
            MIN_DIVIDE_FACTOR, MAX_DIVIDE_FACTOR, divide_factor
        )));
    }
    Ok(())
}

/// Text commands accepted on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Enable,
    Disable,
    Stats(bool),
    Divide(u32),
    Status,
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut words = value.split_whitespace();
        let cmd = words.next().unwrap_or("").to_ascii_lowercase();
        let arg = words.next().map(str::to_ascii_lowercase);
        if words.next().is_some() {
            return Err(format!("too many arguments in '{}'", value.trim()));
        }

        match (cmd.as_str(), arg.as_deref()) {
            ("enable" | "start", None) => Ok(Self::Enable),
            ("disable" | "stop", None) => Ok(Self::Disable),
            ("stats", Some("on" | "1" | "true")) => Ok(Self::Stats(true)),
            ("stats", Some("off" | "0" | "false")) => Ok(Self::Stats(false)),
            ("divide", Some(n)) => n
                .parse()
                .map(Self::Divide)
                .map_err(|e| format!("invalid divide factor '{}': {}", n, e)),
            ("status", None) => Ok(Self::Status),
            _ => Err(format!(
                "unknown control command '{}'; supported: enable, disable, stats on|off, divide <n>, status",
                value.trim()
            )),
        }
    }
}
