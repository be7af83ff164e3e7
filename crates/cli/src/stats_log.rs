// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Size-capped progress log.
//!
//! Progress lines are kept whole: a line that would cross the cap is dropped
//! along with every line after it, so the file is always a clean prefix of
//! the console output.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters of a [`StatsLog`], readable after the log is owned by the console.
#[derive(Debug, Default)]
pub struct LogUsage {
    bytes: AtomicU64,
    dropped_lines: AtomicU64,
}

impl LogUsage {
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn dropped_lines(&self) -> u64 {
        self.dropped_lines.load(Ordering::Relaxed)
    }
}

pub struct StatsLog<W: Write> {
    inner: W,
    usage: Arc<LogUsage>,
    max_bytes: u64,
    full: bool,
}

impl<W: Write> StatsLog<W> {
    pub fn new(inner: W, max_bytes: u64) -> Self {
        Self {
            inner,
            usage: Arc::new(LogUsage::default()),
            max_bytes,
            full: false,
        }
    }

    pub fn usage(&self) -> Arc<LogUsage> {
        Arc::clone(&self.usage)
    }

    fn append(&mut self, line: &[u8]) -> io::Result<()> {
        if !self.full {
            let used = self.usage.bytes();
            if used + line.len() as u64 <= self.max_bytes {
                self.inner.write_all(line)?;
                self.usage.bytes.fetch_add(line.len() as u64, Ordering::Relaxed);
                return Ok(());
            }
            self.full = true;
            tracing::warn!(
                "Stats log reached {} of {} bytes; dropping further lines",
                used,
                self.max_bytes
            );
        }
        self.usage.dropped_lines.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl<W: Write> Write for StatsLog<W> {
    /// Always reports the whole buffer as taken; dropped lines are counted,
    /// never surfaced as errors.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for line in buf.split_inclusive(|&b| b == b'\n') {
            self.append(line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
