// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use memfeed_config::{PollConfig, PollMode};
use std::time::Duration;

/// What the loop does after an iteration that made no progress.
///
/// `Spin` is the bare-metal behavior: poll again immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPolicy {
    #[default]
    Spin,
    Yield,
    Sleep(Duration),
}

impl PollPolicy {
    pub fn from_config(config: &PollConfig) -> Self {
        match config.mode {
            PollMode::Spin => Self::Spin,
            PollMode::Yield => Self::Yield,
            PollMode::Sleep => {
                Self::Sleep(Duration::from_micros(config.interval_us.unwrap_or_default()))
            }
        }
    }

    pub fn pause(&self) {
        match self {
            Self::Spin => std::hint::spin_loop(),
            Self::Yield => std::thread::yield_now(),
            Self::Sleep(interval) => std::thread::sleep(*interval),
        }
    }
}
