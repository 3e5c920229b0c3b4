// Copyright 2025 The Minikern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Sub-devices
//!
//! A sub-device publishes a contiguous block range of a parent device as
//! a standalone device: same block size and erase byte, block numbers
//! translated by the start offset, bounds enforced against the child's
//! own geometry. The child holds an open handle on its parent for its
//! whole lifetime, and can itself be a parent.

use super::{BlockDev, BlockDriver};
use crate::types::{status, Result};
use alloc::boxed::Box;
use alloc::sync::Arc;

struct SubDev {
    parent: Arc<BlockDev>,
    start_block: u64,
}

impl BlockDriver for SubDev {
    fn read_block(&self, buf: &mut [u8], block: u64, count: u32) -> Result<usize> {
        self.parent.read_block(buf, self.start_block + block, count)
    }

    fn write_block(&self, buf: &[u8], block: u64, count: u32) -> Result<usize> {
        self.parent.write_block(buf, self.start_block + block, count)
    }

    fn erase(&self, block: u64, count: u32) -> Result<usize> {
        let bs = self.parent.block_size() as u64;
        self.parent
            .erase((self.start_block + block) * bs, count as u64 * bs)
    }

    // Async stays on the default synthesized path, which re-enters the
    // block entries above with translation applied.
}

impl Drop for SubDev {
    fn drop(&mut self) {
        // Give the parent handle back when the child goes away.
        self.parent.close_ref();
    }
}

/// Publish `block_count` blocks of `parent_name`, starting at
/// `start_block`, as the new device `child_name`.
///
/// # Returns
///
/// * `ERR_NOT_FOUND` - no such parent
/// * `ERR_OUT_OF_RANGE` - the range escapes the parent
/// * `ERR_INVALID_ARGS` - zero-length child
/// * `ERR_ALREADY_EXISTS` - the child name is taken
pub fn publish_subdevice(
    parent_name: &str,
    child_name: &str,
    start_block: u64,
    block_count: u64,
) -> Result {
    let parent = super::open(parent_name).ok_or(status::ERR_NOT_FOUND)?;

    if block_count == 0 {
        super::close(parent);
        return Err(status::ERR_INVALID_ARGS);
    }
    let in_range = start_block
        .checked_add(block_count)
        .map_or(false, |end| end <= parent.block_count());
    if !in_range {
        super::close(parent);
        return Err(status::ERR_OUT_OF_RANGE);
    }

    let block_size = parent.block_size();
    let erase_byte = parent.erase_byte();
    let child = BlockDev::new(
        child_name,
        block_size,
        block_count,
        erase_byte,
        Box::new(SubDev { parent, start_block }),
    );

    // On a name collision the child (and with it the parent handle)
    // drops right here.
    super::register(child)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::{self, create_membdev};

    #[test]
    fn test_publish_validation() {
        create_membdev("sub_val_parent", 32 * 512).unwrap();

        assert_eq!(
            publish_subdevice("no_such_dev", "sub_x", 0, 1),
            Err(status::ERR_NOT_FOUND)
        );
        assert_eq!(
            publish_subdevice("sub_val_parent", "sub_x", 30, 3),
            Err(status::ERR_OUT_OF_RANGE)
        );
        assert_eq!(
            publish_subdevice("sub_val_parent", "sub_x", 0, 0),
            Err(status::ERR_INVALID_ARGS)
        );

        // Failed publications must not leak parent references.
        let parent = bio::open("sub_val_parent").unwrap();
        assert_eq!(parent.open_count(), 1);
        bio::close(parent);

        bio::unregister("sub_val_parent").unwrap();
    }

    #[test]
    fn test_translation() {
        create_membdev("sub_tr_parent", 64 * 512).unwrap();
        publish_subdevice("sub_tr_parent", "sub_tr_child", 7, 30).unwrap();

        let parent = bio::open("sub_tr_parent").unwrap();
        let child = bio::open("sub_tr_child").unwrap();

        assert_eq!(child.block_count(), 30);
        assert_eq!(child.total_size(), 30 * 512);

        let pattern = alloc::vec![0x5Au8; 512];
        assert_eq!(child.write_block(&pattern, 3, 1), Ok(512));

        // Child block 3 is parent block 10.
        let mut back = alloc::vec![0u8; 512];
        assert_eq!(parent.read_block(&mut back, 10, 1), Ok(512));
        assert_eq!(back, pattern);

        // Child bounds are the child's own.
        assert_eq!(
            child.write_block(&pattern, 30, 1),
            Err(status::ERR_OUT_OF_RANGE)
        );
        let mut big = alloc::vec![0u8; 512];
        assert_eq!(child.read(&mut big, 30 * 512 - 256), Err(status::ERR_OUT_OF_RANGE));

        bio::close(child);
        bio::close(parent);
        bio::unregister("sub_tr_child").unwrap();
        bio::unregister("sub_tr_parent").unwrap();
    }

    #[test]
    fn test_parent_reference_lifetime() {
        create_membdev("sub_ref_parent", 16 * 512).unwrap();
        publish_subdevice("sub_ref_parent", "sub_ref_child", 0, 8).unwrap();

        let parent = bio::open("sub_ref_parent").unwrap();
        // One ref from the child, one from us.
        assert_eq!(parent.open_count(), 2);

        bio::unregister("sub_ref_child").unwrap();
        // The registry's Arc was the last one; the child dropped and
        // released its parent handle.
        assert_eq!(parent.open_count(), 1);

        bio::close(parent);
        bio::unregister("sub_ref_parent").unwrap();
    }
}
