// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::feed::{Submission, WrapReason};
use crate::regs::FifoStatus;
use crate::FeedObserver;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct FeedMetrics {
    iterations: AtomicU64,
    idle: AtomicU64,
    backpressure: AtomicU64,
    threshold_wraps: AtomicU64,
    bound_wraps: AtomicU64,
    submissions: AtomicU64,
    words_written: AtomicU64,
    bytes_written: AtomicU64,
    start_time: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub iterations: u64,
    pub idle: u64,
    pub backpressure: u64,
    pub threshold_wraps: u64,
    pub bound_wraps: u64,
    pub submissions: u64,
    pub words_written: u64,
    pub bytes_written: u64,
    pub bytes_per_sec: f64,
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            iterations: AtomicU64::new(0),
            idle: AtomicU64::new(0),
            backpressure: AtomicU64::new(0),
            threshold_wraps: AtomicU64::new(0),
            bound_wraps: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            words_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn get_submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn get_bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    pub fn get_bytes_per_sec(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.get_bytes_written() as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            iterations: self.iterations.load(Ordering::SeqCst),
            idle: self.idle.load(Ordering::SeqCst),
            backpressure: self.backpressure.load(Ordering::SeqCst),
            threshold_wraps: self.threshold_wraps.load(Ordering::SeqCst),
            bound_wraps: self.bound_wraps.load(Ordering::SeqCst),
            submissions: self.get_submissions(),
            words_written: self.words_written.load(Ordering::SeqCst),
            bytes_written: self.get_bytes_written(),
            bytes_per_sec: self.get_bytes_per_sec(),
        }
    }
}

impl FeedObserver for FeedMetrics {
    fn on_idle(&self) {
        self.iterations.fetch_add(1, Ordering::SeqCst);
        self.idle.fetch_add(1, Ordering::SeqCst);
    }

    fn on_backpressure(&self, _fifo: FifoStatus) {
        self.iterations.fetch_add(1, Ordering::SeqCst);
        self.backpressure.fetch_add(1, Ordering::SeqCst);
    }

    fn on_wrap(&self, reason: WrapReason) {
        self.iterations.fetch_add(1, Ordering::SeqCst);
        match reason {
            WrapReason::Threshold => self.threshold_wraps.fetch_add(1, Ordering::SeqCst),
            WrapReason::AddressBound => self.bound_wraps.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn on_submit(&self, submission: &Submission) {
        self.iterations.fetch_add(1, Ordering::SeqCst);
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.words_written
            .fetch_add(submission.words as u64, Ordering::SeqCst);
        self.bytes_written
            .fetch_add(submission.bytes as u64, Ordering::SeqCst);
    }
}
