// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Memory Block Device
//!
//! A RAM-backed block device, mostly useful for tests, ramdisks, and as
//! the reference driver for the bio layer. Reads of unwritten storage
//! return zeroes, so the erase byte is 0.

use super::{BlockDev, BlockDriver};
use crate::types::{status, Result};
use alloc::boxed::Box;
use alloc::sync::Arc;
use spin::Mutex;

/// Block size of memory devices
pub const MEM_BLOCK_SIZE: u32 = 512;

const MEM_ERASE_BYTE: u8 = 0x00;

struct MemDisk {
    data: Arc<Mutex<Box<[u8]>>>,
    erase_byte: u8,
}

impl BlockDriver for MemDisk {
    fn read_block(&self, buf: &mut [u8], block: u64, count: u32) -> Result<usize> {
        let bytes = count as usize * MEM_BLOCK_SIZE as usize;
        let off = block as usize * MEM_BLOCK_SIZE as usize;
        let data = self.data.lock();
        buf[..bytes].copy_from_slice(&data[off..off + bytes]);
        Ok(bytes)
    }

    fn write_block(&self, buf: &[u8], block: u64, count: u32) -> Result<usize> {
        let bytes = count as usize * MEM_BLOCK_SIZE as usize;
        let off = block as usize * MEM_BLOCK_SIZE as usize;
        let mut data = self.data.lock();
        data[off..off + bytes].copy_from_slice(&buf[..bytes]);
        Ok(bytes)
    }

    fn erase(&self, block: u64, count: u32) -> Result<usize> {
        let bytes = count as usize * MEM_BLOCK_SIZE as usize;
        let off = block as usize * MEM_BLOCK_SIZE as usize;
        let mut data = self.data.lock();
        data[off..off + bytes].fill(self.erase_byte);
        Ok(bytes)
    }
}

/// Create and register a zero-filled memory device.
///
/// `size` must be a nonzero multiple of [`MEM_BLOCK_SIZE`].
pub fn create_membdev(name: &str, size: usize) -> Result {
    if size == 0 || size % MEM_BLOCK_SIZE as usize != 0 {
        return Err(status::ERR_INVALID_ARGS);
    }
    let data = Arc::new(Mutex::new(
        alloc::vec![0u8; size].into_boxed_slice(),
    ));
    create_membdev_shared(name, data)
}

/// Create and register a memory device over caller-owned storage.
///
/// The caller keeps its `Arc` and can inspect the backing bytes
/// directly, which is how partition-offset behavior gets verified.
pub fn create_membdev_shared(name: &str, data: Arc<Mutex<Box<[u8]>>>) -> Result {
    let size = data.lock().len();
    if size == 0 || size % MEM_BLOCK_SIZE as usize != 0 {
        return Err(status::ERR_INVALID_ARGS);
    }

    let dev = BlockDev::new(
        name,
        MEM_BLOCK_SIZE,
        (size / MEM_BLOCK_SIZE as usize) as u64,
        MEM_ERASE_BYTE,
        Box::new(MemDisk {
            data,
            erase_byte: MEM_ERASE_BYTE,
        }),
    );
    super::register(dev)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio;

    #[test]
    fn test_size_must_be_block_multiple() {
        assert_eq!(create_membdev("mem_bad", 1000), Err(status::ERR_INVALID_ARGS));
        assert_eq!(create_membdev("mem_bad", 0), Err(status::ERR_INVALID_ARGS));
    }

    #[test]
    fn test_roundtrip() {
        create_membdev("mem_rt", 64 * 1024).unwrap();
        let dev = bio::open("mem_rt").unwrap();

        assert_eq!(dev.block_size(), MEM_BLOCK_SIZE);
        assert_eq!(dev.block_count(), 128);
        assert_eq!(dev.erase_byte(), 0x00);

        let pattern: alloc::vec::Vec<u8> = (0..2048).map(|i| (i & 0xFF) as u8).collect();
        assert_eq!(dev.write_block(&pattern, 2, 4), Ok(2048));

        let mut back = alloc::vec![0u8; 2048];
        assert_eq!(dev.read_block(&mut back, 2, 4), Ok(2048));
        assert_eq!(back, pattern);

        // Untouched blocks stay zero.
        let mut front = alloc::vec![0xFFu8; 1024];
        assert_eq!(dev.read_block(&mut front, 0, 2), Ok(1024));
        assert!(front.iter().all(|&b| b == 0));

        bio::close(dev);
        bio::unregister("mem_rt").unwrap();
    }

    #[test]
    fn test_unaligned_rmw() {
        create_membdev("mem_unaligned", 16 * 1024).unwrap();
        let dev = bio::open("mem_unaligned").unwrap();

        // Straddle a block boundary from an odd offset.
        let pattern: alloc::vec::Vec<u8> = (0..700u32).map(|i| (i * 7 & 0xFF) as u8).collect();
        assert_eq!(dev.write(&pattern, 100), Ok(700));

        let mut back = alloc::vec![0u8; 700];
        assert_eq!(dev.read(&mut back, 100), Ok(700));
        assert_eq!(back, pattern);

        // Bytes around the write are untouched.
        let mut edge = [0u8; 4];
        assert_eq!(dev.read(&mut edge, 96), Ok(4));
        assert_eq!(edge, [0, 0, 0, 0]);
        assert_eq!(dev.read(&mut edge, 800), Ok(4));
        assert_eq!(edge, [0, 0, 0, 0]);

        bio::close(dev);
        bio::unregister("mem_unaligned").unwrap();
    }

    #[test]
    fn test_erase_fills_erase_byte() {
        create_membdev("mem_erase", 8 * 1024).unwrap();
        let dev = bio::open("mem_erase").unwrap();

        let ones = alloc::vec![0xAAu8; 1024];
        assert_eq!(dev.write(&ones, 512), Ok(1024));
        assert_eq!(dev.erase(512, 1024), Ok(1024));

        let mut back = alloc::vec![0xFFu8; 1024];
        assert_eq!(dev.read(&mut back, 512), Ok(1024));
        assert!(back.iter().all(|&b| b == 0x00));

        bio::close(dev);
        bio::unregister("mem_erase").unwrap();
    }

    #[test]
    fn test_shared_backing_is_visible() {
        let data = Arc::new(Mutex::new(alloc::vec![0u8; 4096].into_boxed_slice()));
        create_membdev_shared("mem_shared", data.clone()).unwrap();
        let dev = bio::open("mem_shared").unwrap();

        assert_eq!(dev.write(&[0xDE, 0xAD, 0xBE, 0xEF], 1000), Ok(4));
        assert_eq!(&data.lock()[1000..1004], &[0xDE, 0xAD, 0xBE, 0xEF]);

        bio::close(dev);
        bio::unregister("mem_shared").unwrap();
    }
}
