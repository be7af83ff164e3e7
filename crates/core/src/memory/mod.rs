// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{BufferMemory, FeedError, FeedResult};

/// A simple flat memory storage standing in for the buffer window.
///
/// Flushes are recorded rather than performed so tests can check that every
/// submitted range was made visible before the peripheral was triggered.
#[derive(Debug)]
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u64,
    flushed_bytes: u64,
    last_flush: Option<(u64, u64)>,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
            flushed_bytes: 0,
            last_flush: None,
        }
    }

    pub fn end_addr(&self) -> u64 {
        self.base_addr + self.data.len() as u64
    }

    fn range(&self, addr: u64, len: u64) -> FeedResult<std::ops::Range<usize>> {
        if addr < self.base_addr || addr.saturating_add(len) > self.end_addr() {
            return Err(FeedError::MemoryViolation(addr));
        }
        let start = (addr - self.base_addr) as usize;
        Ok(start..start + len as usize)
    }

    pub fn read_u8(&self, addr: u64) -> Option<u8> {
        self.range(addr, 1).ok().map(|r| self.data[r.start])
    }

    /// Total number of bytes passed to `flush_range` so far.
    pub fn flushed_bytes(&self) -> u64 {
        self.flushed_bytes
    }

    /// `(addr, len)` of the most recent flush.
    pub fn last_flush(&self) -> Option<(u64, u64)> {
        self.last_flush
    }
}

impl BufferMemory for LinearMemory {
    fn read_u64(&self, addr: u64) -> FeedResult<u64> {
        let r = self.range(addr, 8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[r]);
        Ok(u64::from_le_bytes(bytes))
    }

    fn write_u64(&mut self, addr: u64, value: u64) -> FeedResult<()> {
        let r = self.range(addr, 8)?;
        self.data[r].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn flush_range(&mut self, addr: u64, len: u64) -> FeedResult<()> {
        self.range(addr, len)?;
        self.flushed_bytes += len;
        self.last_flush = Some((addr, len));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mut mem = LinearMemory::new(1024, 0x1000);

        // Valid write
        mem.write_u64(0x1000, 42).unwrap();
        mem.write_u64(0x13F8, 99).unwrap(); // Last slot

        // Invalid write (out of bounds)
        assert!(matches!(
            mem.write_u64(0x0FF8, 1),
            Err(FeedError::MemoryViolation(0x0FF8))
        ));
        assert!(mem.write_u64(0x13FC, 1).is_err()); // straddles the end
        assert!(mem.write_u64(0x1400, 1).is_err());

        // Valid read
        assert_eq!(mem.read_u64(0x1000).unwrap(), 42);
        assert_eq!(mem.read_u64(0x13F8).unwrap(), 99);

        // Invalid read
        assert!(mem.read_u64(0x1400).is_err());
    }

    #[test]
    fn test_little_endian_layout() {
        let mut mem = LinearMemory::new(16, 0x2000);
        mem.write_u64(0x2000, 0x0807_0605_0403_0201).unwrap();
        assert_eq!(mem.read_u8(0x2000), Some(0x01));
        assert_eq!(mem.read_u8(0x2007), Some(0x08));
        assert_eq!(mem.read_u8(0x2010), None);
    }

    #[test]
    fn test_flush_is_recorded() {
        let mut mem = LinearMemory::new(256, 0x1000);
        assert_eq!(mem.last_flush(), None);

        mem.flush_range(0x1000, 24).unwrap();
        mem.flush_range(0x1018, 40).unwrap();
        assert_eq!(mem.flushed_bytes(), 64);
        assert_eq!(mem.last_flush(), Some((0x1018, 40)));

        // Flushing past the end is a violation and is not recorded
        assert!(mem.flush_range(0x10F8, 16).is_err());
        assert_eq!(mem.flushed_bytes(), 64);
    }
}
