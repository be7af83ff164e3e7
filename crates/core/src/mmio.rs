// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Hardware backends.
//!
//! [`VolatileBlock`] drives registers through a raw pointer (bare metal, or a
//! page mapped by the OS). [`DevMem`] maps the register block and the buffer
//! window from `/dev/mem`, which requires root.

use crate::{BufferMemory, FeedError, FeedResult, RegisterBackend};
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{fence, Ordering};

const PAGE_SIZE: u64 = 4096;

/// 32-bit registers accessed with volatile loads and stores.
pub struct VolatileBlock {
    ptr: *mut u8,
    len: usize,
}

impl std::fmt::Debug for VolatileBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileBlock")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: the block is the only owner of its register window; the pointer
// stays valid wherever the block is moved.
unsafe impl Send for VolatileBlock {}

impl VolatileBlock {
    /// # Safety
    ///
    /// `ptr` must be 4-byte aligned and valid for volatile reads and writes
    /// of `len` bytes for as long as the block is used.
    pub unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    fn checked(&self, offset: u64) -> FeedResult<usize> {
        let off = offset as usize;
        if offset % 4 != 0 || off.saturating_add(4) > self.len {
            return Err(FeedError::MemoryViolation(offset));
        }
        Ok(off)
    }
}

impl RegisterBackend for VolatileBlock {
    fn read_u32(&self, offset: u64) -> FeedResult<u32> {
        let off = self.checked(offset)?;
        // SAFETY: bounds and alignment checked above; validity is the constructor's contract.
        Ok(unsafe { self.ptr.add(off).cast::<u32>().read_volatile() })
    }

    fn write_u32(&mut self, offset: u64, value: u32) -> FeedResult<()> {
        let off = self.checked(offset)?;
        // SAFETY: as in `read_u32`.
        unsafe { self.ptr.add(off).cast::<u32>().write_volatile(value) };
        Ok(())
    }
}

/// A page-aligned mapping of a physical range.
struct PhysMapping {
    map: MmapMut,
    phys_base: u64,
    page_offset: usize,
    len: usize,
}

impl PhysMapping {
    fn map(path: &Path, phys_base: u64, len: usize) -> FeedResult<Self> {
        let dev = OpenOptions::new().read(true).write(true).open(path)?;
        let page_offset = (phys_base % PAGE_SIZE) as usize;
        let aligned_base = phys_base - page_offset as u64;

        let map = unsafe {
            MmapOptions::new()
                .offset(aligned_base)
                .len(len + page_offset)
                .map_mut(&dev)
                .map_err(|e| FeedError::Map(format!("{:#x}+{:#x}: {}", phys_base, len, e)))?
        };

        tracing::debug!(
            "Mapped {:?} {:#x}..{:#x}",
            path,
            phys_base,
            phys_base + len as u64
        );
        Ok(Self {
            map,
            phys_base,
            page_offset,
            len,
        })
    }

    fn offset_of(&self, addr: u64, size: u64) -> FeedResult<usize> {
        if addr < self.phys_base || addr.saturating_add(size) > self.phys_base + self.len as u64 {
            return Err(FeedError::MemoryViolation(addr));
        }
        Ok(self.page_offset + (addr - self.phys_base) as usize)
    }

    /// Offset of an aligned 64-bit slot.
    fn word_offset(&self, addr: u64) -> FeedResult<usize> {
        if addr % 8 != 0 {
            return Err(FeedError::MemoryViolation(addr));
        }
        self.offset_of(addr, 8)
    }
}

/// Register block mapped from `/dev/mem`.
pub struct DevMemRegisters {
    // Keeps the mapping alive for `block`.
    _mapping: PhysMapping,
    block: VolatileBlock,
}

impl std::fmt::Debug for DevMemRegisters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevMemRegisters")
            .field("phys_base", &format_args!("{:#x}", self._mapping.phys_base))
            .field("block", &self.block)
            .finish()
    }
}

impl RegisterBackend for DevMemRegisters {
    fn read_u32(&self, offset: u64) -> FeedResult<u32> {
        self.block.read_u32(offset)
    }

    fn write_u32(&mut self, offset: u64, value: u32) -> FeedResult<()> {
        self.block.write_u32(offset, value)
    }
}

/// Buffer window mapped from `/dev/mem`.
pub struct DevMemWindow {
    mapping: PhysMapping,
}

impl BufferMemory for DevMemWindow {
    fn read_u64(&self, addr: u64) -> FeedResult<u64> {
        let off = self.mapping.word_offset(addr)?;
        // SAFETY: word_offset keeps the aligned access inside the mapping.
        Ok(unsafe { self.mapping.map.as_ptr().add(off).cast::<u64>().read_volatile() })
    }

    fn write_u64(&mut self, addr: u64, value: u64) -> FeedResult<()> {
        let off = self.mapping.word_offset(addr)?;
        // SAFETY: as in `read_u64`.
        unsafe {
            self.mapping
                .map
                .as_mut_ptr()
                .add(off)
                .cast::<u64>()
                .write_volatile(value)
        };
        Ok(())
    }

    fn flush_range(&mut self, addr: u64, len: u64) -> FeedResult<()> {
        let off = self.mapping.offset_of(addr, len)?;
        self.mapping.map.flush_range(off, len as usize)?;
        fence(Ordering::SeqCst);
        Ok(())
    }
}

pub struct DevMem;

impl DevMem {
    pub const PATH: &'static str = "/dev/mem";

    /// Map the register block at `register_base` and `window_len` bytes of
    /// buffer window at `window_base`.
    pub fn open(
        register_base: u64,
        window_base: u64,
        window_len: usize,
    ) -> FeedResult<(DevMemRegisters, DevMemWindow)> {
        Self::open_path(Path::new(Self::PATH), register_base, window_base, window_len)
    }

    /// Like [`DevMem::open`] over any mappable file (e.g. a UIO device).
    pub fn open_path(
        path: &Path,
        register_base: u64,
        window_base: u64,
        window_len: usize,
    ) -> FeedResult<(DevMemRegisters, DevMemWindow)> {
        if register_base % 4 != 0 {
            return Err(FeedError::Map(format!(
                "register base {:#x} is not word aligned",
                register_base
            )));
        }
        let block_len = crate::regs::BLOCK_SIZE as usize;
        let mut regs_map = PhysMapping::map(path, register_base, block_len)?;
        // SAFETY: the pointer addresses `block_len` bytes inside `regs_map`,
        // which lives alongside the block in `DevMemRegisters`.
        let block = unsafe {
            VolatileBlock::new(
                regs_map.map.as_mut_ptr().add(regs_map.page_offset),
                block_len,
            )
        };
        let window = PhysMapping::map(path, window_base, window_len)?;

        Ok((
            DevMemRegisters {
                _mapping: regs_map,
                block,
            },
            DevMemWindow { mapping: window },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{offsets, MemoryReaderRegs};
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_volatile_block_read_write() {
        let mut words = vec![0u32; 15];
        words[7] = 16; // query_fifo_limit
        let mut block =
            unsafe { VolatileBlock::new(words.as_mut_ptr().cast::<u8>(), words.len() * 4) };

        block.write_u32(offsets::CTRL_REG, 1).unwrap();
        assert_eq!(block.read_u32(offsets::QUERY_FIFO_LIMIT).unwrap(), 16);
        assert!(block.read_u32(0x3C).is_err());
        assert!(block.write_u32(0x02, 1).is_err());
        drop(block);
        assert_eq!(words[5], 1);
    }

    #[test]
    fn test_open_path_over_plain_file() {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("memfeed-devmem-{}.bin", nonce));
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(3 * PAGE_SIZE).unwrap();
        drop(file);

        // Register block at page 0 offset 0x100, window at page 1 + 8
        let (regs, mut window) =
            DevMem::open_path(&path, 0x100, PAGE_SIZE + 8, 64).unwrap();
        let mut regs = MemoryReaderRegs::new(regs);
        regs.submit((PAGE_SIZE + 8) as u32, 16).unwrap();
        assert_eq!(
            regs.backend().read_u32(offsets::MEMORY_SIZE_LO).unwrap(),
            16
        );

        window.write_u64(PAGE_SIZE + 8, 0xABCD).unwrap();
        window.flush_range(PAGE_SIZE + 8, 16).unwrap();
        assert_eq!(window.read_u64(PAGE_SIZE + 8).unwrap(), 0xABCD);
        assert!(window.write_u64(PAGE_SIZE + 72, 1).is_err());
        assert!(window.write_u64(PAGE_SIZE + 12, 1).is_err());
        drop(regs);
        drop(window);

        let bytes = std::fs::read(&path).unwrap();
        let at = (PAGE_SIZE + 8) as usize;
        assert_eq!(&bytes[at..at + 8], &0xABCDu64.to_le_bytes());
        let _ = std::fs::remove_file(&path);
    }
}
